use std::fmt;

use crate::config::{Config, PoolerMode, users::UsersError};
use crate::shared_types::{AuthStage, BackendIdentity};

// -----------------------------------------------------------------------------
// ----- DisconnectReason ------------------------------------------------------

/// Why a client session ended. Policy-driven disconnects stay distinct from
/// protocol corruption and from ordinary client exits in the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    ClientTerminate,
    StartupRejected(String),
    AuthFailed,
    ProtocolCorruption(String),
    PolicyOverflow(String),
    PolicyDecisionFailure(String),
    BackendFailure(String),
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ClientClosed => "client_closed",
            DisconnectReason::ClientTerminate => "client_terminate",
            DisconnectReason::StartupRejected(_) => "startup_rejected",
            DisconnectReason::AuthFailed => "auth_failed",
            DisconnectReason::ProtocolCorruption(_) => "protocol_corruption",
            DisconnectReason::PolicyOverflow(_) => "policy_overflow",
            DisconnectReason::PolicyDecisionFailure(_) => "policy_decision_failure",
            DisconnectReason::BackendFailure(_) => "backend_failure",
        }
    }

    /// Clean exits initiated by the client.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            DisconnectReason::ClientClosed | DisconnectReason::ClientTerminate
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::StartupRejected(detail)
            | DisconnectReason::ProtocolCorruption(detail)
            | DisconnectReason::PolicyOverflow(detail)
            | DisconnectReason::PolicyDecisionFailure(detail)
            | DisconnectReason::BackendFailure(detail) => {
                write!(f, "{}: {detail}", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendContext -------------------------------------------------------

#[derive(Debug)]
pub(crate) struct FrontendContext {
    pub(crate) database: Option<String>,
    pub(crate) username: Option<String>,
    pub(crate) pooler_mode: PoolerMode,
    pub(crate) backend_identity: BackendIdentity,
    pub(crate) stage: AuthStage,
    close_reason: Option<DisconnectReason>,
}

impl FrontendContext {
    pub(crate) fn new() -> Self {
        Self {
            database: None,
            username: None,
            pooler_mode: PoolerMode::Session,
            backend_identity: BackendIdentity::random(),
            stage: AuthStage::Startup,
            close_reason: None,
        }
    }

    pub(crate) fn request_close(&mut self, reason: DisconnectReason) {
        self.close_reason.get_or_insert(reason);
    }

    pub(crate) fn take_close_reason(&mut self) -> Option<DisconnectReason> {
        self.close_reason.take()
    }

    pub(crate) fn authenticate(
        &mut self,
        config: &Config,
        supplied_password: &str,
    ) -> Result<(), UsersError> {
        let username = self.username.as_deref().unwrap_or_default();
        let user = config.users.authenticate(username, supplied_password)?;
        self.pooler_mode = user.pooler_mode;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_close_reason_wins() {
        let mut context = FrontendContext::new();
        context.request_close(DisconnectReason::AuthFailed);
        context.request_close(DisconnectReason::ClientClosed);
        assert_eq!(context.take_close_reason(), Some(DisconnectReason::AuthFailed));
        assert_eq!(context.take_close_reason(), None);
    }

    #[test]
    fn reason_names_are_distinct() {
        let policy = DisconnectReason::PolicyOverflow("x".into());
        let corrupt = DisconnectReason::ProtocolCorruption("x".into());
        assert_ne!(policy.as_str(), corrupt.as_str());
        assert!(!policy.is_clean());
        assert!(DisconnectReason::ClientTerminate.is_clean());
        assert_eq!(policy.to_string(), "policy_overflow: x");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
