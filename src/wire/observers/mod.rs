pub mod parse;
pub mod password_message;
pub mod query;
pub mod startup;

pub use parse::ParseFrameObserver;
pub use password_message::PasswordMessageFrameObserver;
pub use query::QueryFrameObserver;
pub use startup::{StartupKind, StartupPacketObserver};
