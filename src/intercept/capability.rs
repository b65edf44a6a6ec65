//! The two decision capabilities and their verdicts.
//!
//! Implementations are opaque to the proxy: they may fail, hang or return
//! garbage. The dispatcher treats every call accordingly.

use std::{fmt, io, process::ExitStatus};

// -----------------------------------------------------------------------------
// ----- Verdicts --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteVerdict {
    /// Forward this and later statements to the pool with this dbkey.
    Route(String),
    NoChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteVerdict {
    Rewrite(String),
    NoChange,
}

// -----------------------------------------------------------------------------
// ----- Capability ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Routing,
    Rewrite,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Routing => f.write_str("routing_rules"),
            Capability::Rewrite => f.write_str("rewrite_query"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Traits ----------------------------------------------------------------

/// `routing_rules(identity, query) -> dbkey | no change`
pub trait RoutingRules: Send + Sync + 'static {
    fn routing_rules(&self, identity: &str, query: &str) -> Result<RouteVerdict, CapabilityError>;
}

/// `rewrite_query(identity, query) -> query`. Returning the input unchanged
/// means "no change".
pub trait QueryRewrite: Send + Sync + 'static {
    fn rewrite_query(&self, identity: &str, query: &str) -> Result<String, CapabilityError>;
}

impl<F> RoutingRules for F
where
    F: Fn(&str, &str) -> Result<RouteVerdict, CapabilityError> + Send + Sync + 'static,
{
    fn routing_rules(&self, identity: &str, query: &str) -> Result<RouteVerdict, CapabilityError> {
        self(identity, query)
    }
}

impl<F> QueryRewrite for F
where
    F: Fn(&str, &str) -> Result<String, CapabilityError> + Send + Sync + 'static,
{
    fn rewrite_query(&self, identity: &str, query: &str) -> Result<String, CapabilityError> {
        self(identity, query)
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("{0}")]
    Message(String),

    #[error("failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} wrote non-UTF-8 output")]
    NonUtf8 { program: String },
}

impl CapabilityError {
    pub fn message(msg: impl Into<String>) -> Self {
        CapabilityError::Message(msg.into())
    }
}
