pub mod backend_connection;

pub use backend_connection::{BackendConnection, BackendError};
