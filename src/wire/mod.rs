pub mod framer;
pub mod observers;
pub mod types;
pub mod utils;

pub use framer::{FrameError, FrameHeader, MessageFramer, ProtocolUnit};
pub use types::MessageType;
