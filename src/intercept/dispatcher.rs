//! Invokes the decision capabilities for one statement.
//!
//! In-process capabilities run on tokio's blocking pool so a slow or hung one
//! stalls only the session waiting on it. Command capabilities run as child
//! processes. With a `decision_timeout` the wait is bounded: an abandoned
//! command is killed, while an abandoned in-process call keeps its blocking
//! thread until it returns and its result is dropped.

use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{task, time};

use crate::config::{
    InterceptConfig,
    intercept::{RewriteSpec, RoutingSpec},
};

use super::{
    capability::{
        Capability, CapabilityError, QueryRewrite, RewriteVerdict, RouteVerdict, RoutingRules,
    },
    command::CommandCapability,
    rules::{RuleRewriter, RuleRouter},
};

// -----------------------------------------------------------------------------
// ----- DecisionDispatcher ----------------------------------------------------

#[derive(Clone, Default)]
pub struct DecisionDispatcher {
    routing: Option<Routing>,
    rewrite: Option<Rewrite>,
    timeout: Option<Duration>,
}

#[derive(Clone)]
enum Routing {
    InProcess(Arc<dyn RoutingRules>),
    Command(CommandCapability),
}

#[derive(Clone)]
enum Rewrite {
    InProcess(Arc<dyn QueryRewrite>),
    Command(CommandCapability),
}

impl std::fmt::Debug for DecisionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionDispatcher")
            .field("routing", &self.routing.is_some())
            .field("rewrite", &self.rewrite.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- DecisionDispatcher: Static --------------------------------------------

impl DecisionDispatcher {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            routing: None,
            rewrite: None,
            timeout,
        }
    }

    pub fn from_config(config: &InterceptConfig) -> Self {
        let mut dispatcher = Self::new(config.decision_timeout);

        dispatcher.routing = config.routing.as_ref().map(|spec| match spec {
            RoutingSpec::Rules(rules) => {
                Routing::InProcess(Arc::new(RuleRouter::new(rules.clone())))
            }
            RoutingSpec::Command(cmd) => Routing::Command(CommandCapability::new(cmd.clone())),
        });

        dispatcher.rewrite = config.rewrite.as_ref().map(|spec| match spec {
            RewriteSpec::Rules(rules) => {
                Rewrite::InProcess(Arc::new(RuleRewriter::new(rules.clone())))
            }
            RewriteSpec::Command(cmd) => Rewrite::Command(CommandCapability::new(cmd.clone())),
        });

        dispatcher
    }

    pub fn with_routing(mut self, routing: impl RoutingRules) -> Self {
        self.routing = Some(Routing::InProcess(Arc::new(routing)));
        self
    }

    pub fn with_rewrite(mut self, rewrite: impl QueryRewrite) -> Self {
        self.rewrite = Some(Rewrite::InProcess(Arc::new(rewrite)));
        self
    }
}

// -----------------------------------------------------------------------------
// ----- DecisionDispatcher: Public --------------------------------------------

impl DecisionDispatcher {
    pub fn routing_enabled(&self) -> bool {
        self.routing.is_some()
    }

    pub fn rewrite_enabled(&self) -> bool {
        self.rewrite.is_some()
    }

    /// `None` when routing is not configured.
    pub async fn route(
        &self,
        identity: &Arc<str>,
        query: &Arc<str>,
    ) -> Option<Result<RouteVerdict, DecisionError>> {
        let capability = Capability::Routing;

        let verdict = match self.routing.as_ref()? {
            Routing::InProcess(routing) => {
                let routing = Arc::clone(routing);
                let (identity, query) = (Arc::clone(identity), Arc::clone(query));
                self.invoke(capability, move || routing.routing_rules(&identity, &query))
                    .await
            }
            Routing::Command(command) => {
                self.bounded(capability, async {
                    command
                        .route(identity, query)
                        .await
                        .map_err(|source| DecisionError::Failed { capability, source })
                })
                .await
            }
        };

        Some(verdict.and_then(check_route))
    }

    /// `None` when rewrite is not configured.
    pub async fn rewrite(
        &self,
        identity: &Arc<str>,
        query: &Arc<str>,
    ) -> Option<Result<RewriteVerdict, DecisionError>> {
        let capability = Capability::Rewrite;

        let text = match self.rewrite.as_ref()? {
            Rewrite::InProcess(rewrite) => {
                let rewrite = Arc::clone(rewrite);
                let (identity, original) = (Arc::clone(identity), Arc::clone(query));
                self.invoke(capability, move || rewrite.rewrite_query(&identity, &original))
                    .await
            }
            Rewrite::Command(command) => {
                self.bounded(capability, async {
                    command
                        .rewrite(identity, query)
                        .await
                        .map_err(|source| DecisionError::Failed { capability, source })
                })
                .await
            }
        };

        Some(text.and_then(|text| check_rewrite(query, text)))
    }
}

// -----------------------------------------------------------------------------
// ----- DecisionDispatcher: Private -------------------------------------------

impl DecisionDispatcher {
    async fn invoke<T, F>(&self, capability: Capability, call: F) -> Result<T, DecisionError>
    where
        F: FnOnce() -> Result<T, CapabilityError> + Send + 'static,
        T: Send + 'static,
    {
        self.bounded(capability, async move {
            match task::spawn_blocking(call).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(source)) => Err(DecisionError::Failed { capability, source }),
                Err(_) => Err(DecisionError::Panicked { capability }),
            }
        })
        .await
    }

    /// Applies `decision_timeout`; the call is dropped when it elapses.
    async fn bounded<T>(
        &self,
        capability: Capability,
        call: impl Future<Output = Result<T, DecisionError>>,
    ) -> Result<T, DecisionError> {
        let Some(limit) = self.timeout else {
            return call.await;
        };

        time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(DecisionError::TimedOut {
                    capability,
                    timeout: limit,
                })
            })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Verdict checks ----------------------------------------------

fn check_route(verdict: RouteVerdict) -> Result<RouteVerdict, DecisionError> {
    if let RouteVerdict::Route(dbkey) = &verdict {
        if dbkey.is_empty() {
            return Err(DecisionError::IllTyped {
                capability: Capability::Routing,
                reason: "empty dbkey",
            });
        }
        if dbkey.contains('\0') {
            return Err(DecisionError::IllTyped {
                capability: Capability::Routing,
                reason: "dbkey contains a NUL byte",
            });
        }
    }
    Ok(verdict)
}

// Statement text travels as a C string; a NUL would truncate it on the wire.
fn check_rewrite(original: &str, text: String) -> Result<RewriteVerdict, DecisionError> {
    if text.contains('\0') {
        return Err(DecisionError::IllTyped {
            capability: Capability::Rewrite,
            reason: "text contains a NUL byte",
        });
    }

    Ok(if text == original {
        RewriteVerdict::NoChange
    } else {
        RewriteVerdict::Rewrite(text)
    })
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("{capability} failed: {source}")]
    Failed {
        capability: Capability,
        source: CapabilityError,
    },

    #[error("{capability} did not answer within {timeout:?}")]
    TimedOut {
        capability: Capability,
        timeout: Duration,
    },

    #[error("{capability} panicked")]
    Panicked { capability: Capability },

    #[error("{capability} returned an unusable verdict: {reason}")]
    IllTyped {
        capability: Capability,
        reason: &'static str,
    },
}

impl DecisionError {
    pub fn capability(&self) -> Capability {
        match self {
            DecisionError::Failed { capability, .. }
            | DecisionError::TimedOut { capability, .. }
            | DecisionError::Panicked { capability }
            | DecisionError::IllTyped { capability, .. } => *capability,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
