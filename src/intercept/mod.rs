pub mod assembler;
pub mod capability;
pub mod command;
pub mod dispatcher;
pub mod forwarder;
pub mod pipeline;
pub mod rewriter;
pub mod router;
pub mod rules;
pub mod stats;

pub use assembler::{AssemblyState, QueryAssembler, Statement, Step};
pub use capability::{CapabilityError, QueryRewrite, RewriteVerdict, RouteVerdict, RoutingRules};
pub use dispatcher::{DecisionDispatcher, DecisionError};
pub use forwarder::{ForwardError, Forwarder};
pub use pipeline::{InterceptSession, OverflowStage, Pump, SessionError};
pub use router::{PoolRouter, RouteOutcome};
pub use stats::InterceptStats;
