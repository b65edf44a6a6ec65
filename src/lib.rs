pub mod analytics;
pub mod backend;
pub mod config;
pub mod errors;
pub mod frontend;
pub mod gateway;
pub mod intercept;
pub mod server;
pub mod shared_types;
pub mod wire;

pub use config::Config;
pub use errors::ErrorResponse;
pub use frontend::{DisconnectReason, FrontendConnection};
pub use intercept::{DecisionDispatcher, QueryRewrite, RewriteVerdict, RouteVerdict, RoutingRules};
pub use server::Server;
