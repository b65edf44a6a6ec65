pub mod cli;
pub mod config;
pub mod intercept;
pub mod pools;
pub mod types;
pub mod users;

pub use config::{Config, ConfigError};
pub use intercept::{FailurePolicy, InterceptConfig};
pub use pools::{PoolRecord, PoolsConfig};
pub use types::LogLevel;
pub use users::{PoolerMode, UserRecord, UsersConfig};
