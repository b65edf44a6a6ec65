pub mod peek_backend;
pub mod read_cstr;

pub use peek_backend::{InvalidBackendFrame, peek_backend};
pub use read_cstr::{ReadCStrError, read_cstr, read_cstr_take};
