pub mod link;
pub mod pool;

pub use link::BackendLink;
pub use pool::{GatewayPools, PoolStats, PooledConnection, ServerPool};
