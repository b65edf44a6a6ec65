//! Per-session interception: framer → assembler → dispatcher → router →
//! rewriter → forwarder.

use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::{FailurePolicy, InterceptConfig},
    wire::{FrameError, MessageFramer, MessageType, ProtocolUnit},
};

use super::{
    assembler::{AssemblyState, QueryAssembler, Statement, Step},
    capability::{RewriteVerdict, RouteVerdict},
    dispatcher::{DecisionDispatcher, DecisionError},
    forwarder::{ForwardError, Forwarder},
    rewriter::{RewriteError, rewrite_statement},
    router::{PoolRouter, RouteOutcome},
    stats::InterceptStats,
};

// -----------------------------------------------------------------------------
// ----- Pump ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    /// Every complete unit was forwarded; read more client bytes.
    NeedMore,
    /// The client sent Terminate.
    Terminated,
}

// -----------------------------------------------------------------------------
// ----- InterceptSession ------------------------------------------------------

#[derive(Debug)]
pub struct InterceptSession {
    identity: Arc<str>,
    assembler: QueryAssembler,
    router: PoolRouter,
    dispatcher: Arc<DecisionDispatcher>,
    policy: FailurePolicy,
    capacity: usize,
    stats: InterceptStats,
}

// -----------------------------------------------------------------------------
// ----- InterceptSession: Static ----------------------------------------------

impl InterceptSession {
    /// `default_pool` must already be a configured dbkey.
    pub fn new(
        identity: &str,
        default_pool: &str,
        config: &InterceptConfig,
        dispatcher: Arc<DecisionDispatcher>,
    ) -> Self {
        // Statements are bounded only when they may be rewritten.
        let bound = dispatcher
            .rewrite_enabled()
            .then_some(config.buffer_capacity);

        Self {
            identity: Arc::from(identity),
            assembler: QueryAssembler::new(bound),
            router: PoolRouter::new(default_pool),
            dispatcher,
            policy: config.failure_policy,
            capacity: config.buffer_capacity,
            stats: InterceptStats::default(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- InterceptSession: Public ----------------------------------------------

impl InterceptSession {
    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[inline]
    pub fn current_pool(&self) -> &str {
        self.router.current()
    }

    #[inline]
    pub fn assembly_state(&self) -> AssemblyState {
        self.assembler.state()
    }

    #[inline]
    pub fn stats(&self) -> InterceptStats {
        self.stats
    }

    /// Forward every complete unit the framer holds, in order.
    pub async fn pump<F: Forwarder>(
        &mut self,
        framer: &mut MessageFramer,
        forwarder: &mut F,
    ) -> Result<Pump, SessionError> {
        loop {
            match self.assembler.advance(framer)? {
                Step::NeedMore => return Ok(Pump::NeedMore),

                Step::Bypass(unit) => {
                    if unit.message_type() == MessageType::Terminate {
                        return Ok(Pump::Terminated);
                    }
                    self.forward(unit, forwarder).await?;
                }

                Step::Overflowed(header) => {
                    self.stats.statement();
                    self.on_overflow(OverflowStage::Assembly, header.total_len)?;
                }

                Step::Fragment { bytes, first } => {
                    let pool = self.router.current();
                    if first {
                        forwarder.forward(&self.identity, pool, bytes).await?;
                    } else {
                        forwarder.forward_continuation(pool, bytes).await?;
                    }
                }

                Step::Ready(statement) => {
                    let result = self.handle_statement(statement, forwarder).await;
                    self.assembler.complete();
                    result?;
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- InterceptSession: Private ---------------------------------------------

impl InterceptSession {
    async fn handle_statement<F: Forwarder>(
        &mut self,
        mut statement: Statement,
        forwarder: &mut F,
    ) -> Result<(), SessionError> {
        self.stats.statement();

        let Some(text) = statement.text().map(Arc::<str>::from) else {
            debug!(user = %self.identity, "unreadable statement body, forwarding as is");
            return self.forward(statement.into_unit(), forwarder).await;
        };

        if let Some(verdict) = self.dispatcher.route(&self.identity, &text).await {
            match verdict {
                Ok(verdict) => self.apply_route(&verdict, forwarder).await?,
                Err(e) => self.on_decision_failure(e)?,
            }
        }

        if let Some(verdict) = self.dispatcher.rewrite(&self.identity, &text).await {
            match verdict {
                Ok(RewriteVerdict::Rewrite(new_text)) => {
                    match rewrite_statement(&mut statement, &new_text, self.capacity) {
                        Ok(rewritten) => {
                            self.stats.rewrite();
                            debug!(
                                user = %self.identity,
                                old_len = rewritten.old_len,
                                new_len = rewritten.new_len,
                                "statement rewritten"
                            );
                        }
                        Err(RewriteError::Overflow { required, .. }) => {
                            self.on_overflow(OverflowStage::Rewrite, required)?;
                        }
                        Err(RewriteError::NoText) => {}
                    }
                }
                Ok(RewriteVerdict::NoChange) => {}
                Err(e) => self.on_decision_failure(e)?,
            }
        }

        self.forward(statement.into_unit(), forwarder).await
    }

    async fn apply_route<F: Forwarder>(
        &mut self,
        verdict: &RouteVerdict,
        forwarder: &mut F,
    ) -> Result<(), SessionError> {
        // Only a real switch needs to know whether the backend is mid-transaction.
        let pinned = match verdict {
            RouteVerdict::Route(key)
                if key != self.router.current() && forwarder.is_valid_pool_key(key) =>
            {
                forwarder.pinned_pool().await?
            }
            _ => None,
        };

        let outcome = self.router.apply(
            verdict,
            |key| forwarder.is_valid_pool_key(key),
            pinned.as_deref(),
        );

        match outcome {
            RouteOutcome::Unchanged => {}
            RouteOutcome::Switched { from, to } => {
                self.stats.reroute();
                info!(user = %self.identity, from = %from, to = %to, "session rerouted");
            }
            RouteOutcome::Invalid { requested } => {
                self.stats.invalid_route();
                warn!(
                    user = %self.identity,
                    pool = %self.router.current(),
                    "routing verdict names unknown dbkey '{requested}', keeping current pool"
                );
            }
            RouteOutcome::Pinned { requested, pinned } => {
                self.stats.pinned_route();
                warn!(
                    user = %self.identity,
                    pool = %pinned,
                    "refusing switch to '{requested}' inside an open transaction"
                );
            }
        }

        Ok(())
    }

    async fn forward<F: Forwarder>(
        &mut self,
        unit: ProtocolUnit,
        forwarder: &mut F,
    ) -> Result<(), SessionError> {
        forwarder
            .forward(&self.identity, self.router.current(), unit.into_bytes())
            .await?;
        Ok(())
    }

    fn on_overflow(&mut self, stage: OverflowStage, required: usize) -> Result<(), SessionError> {
        self.stats.overflow();
        warn!(
            user = %self.identity,
            policy = self.policy.as_str(),
            "{stage} overflow: statement needs {required} bytes, capacity is {}",
            self.capacity
        );

        match self.policy {
            FailurePolicy::PassThrough => Ok(()),
            FailurePolicy::Disconnect => Err(SessionError::BufferOverflow {
                stage,
                required,
                capacity: self.capacity,
            }),
        }
    }

    fn on_decision_failure(&mut self, error: DecisionError) -> Result<(), SessionError> {
        self.stats.decision_failure();
        warn!(
            user = %self.identity,
            policy = self.policy.as_str(),
            "decision failure: {error}"
        );

        match self.policy {
            FailurePolicy::PassThrough => Ok(()),
            FailurePolicy::Disconnect => Err(SessionError::DecisionFailure(error)),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowStage {
    /// The original statement does not fit.
    Assembly,
    /// The rewritten statement does not fit.
    Rewrite,
}

impl fmt::Display for OverflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowStage::Assembly => f.write_str("assembly"),
            OverflowStage::Rewrite => f.write_str("rewrite"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol corruption: {0}")]
    ProtocolCorruption(#[from] FrameError),

    #[error("{stage} overflow: statement needs {required} bytes, capacity is {capacity}")]
    BufferOverflow {
        stage: OverflowStage,
        required: usize,
        capacity: usize,
    },

    #[error("decision failure: {0}")]
    DecisionFailure(#[from] DecisionError),

    #[error("forward failed: {0}")]
    Forward(#[from] ForwardError),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
