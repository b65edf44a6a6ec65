pub mod connection;

pub(crate) mod buffers;
pub(crate) mod context;
pub(crate) mod handlers;
pub(crate) mod proxy_responses;

pub use connection::FrontendConnection;
pub use context::DisconnectReason;
