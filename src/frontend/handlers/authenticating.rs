use tracing::warn;

use crate::config::Config;
use crate::errors::ErrorResponse;
use crate::frontend::buffers::FrontendBuffers;
use crate::frontend::context::{DisconnectReason, FrontendContext};
use crate::frontend::proxy_responses as responses;
use crate::shared_types::{AuthStage, ReadyStatus};
use crate::wire::ProtocolUnit;
use crate::wire::observers::PasswordMessageFrameObserver;

// -----------------------------------------------------------------------------
// ----- Authenticating Handler ------------------------------------------------

pub(crate) fn handle_authenticating(
    context: &mut FrontendContext,
    buffers: &mut FrontendBuffers,
    config: &Config,
    unit: ProtocolUnit,
) {
    let Ok(frame) = PasswordMessageFrameObserver::new(unit.as_bytes()) else {
        let error = ErrorResponse::protocol_violation("expected password message");
        buffers.queue_response(&error.to_bytes());
        context.request_close(DisconnectReason::ProtocolCorruption(error.message));
        return;
    };

    if let Err(e) = context.authenticate(config, frame.password()) {
        let username = context.username.as_deref().unwrap_or_default();
        warn!(user = username, error = %e, "authentication failed");

        let error = ErrorResponse::invalid_password(format!(
            "password authentication failed for user \"{username}\""
        ));
        buffers.queue_response(&error.to_bytes());
        context.request_close(DisconnectReason::AuthFailed);
        return;
    }

    context.stage = AuthStage::Ready;

    buffers.queue_response(&responses::auth_ok());

    // ParameterStatus, enough for common drivers
    buffers.queue_response(&responses::param_status("server_version", "16.0"));
    buffers.queue_response(&responses::param_status("server_encoding", "UTF8"));
    buffers.queue_response(&responses::param_status("client_encoding", "UTF8"));
    buffers.queue_response(&responses::param_status("DateStyle", "ISO, MDY"));
    buffers.queue_response(&responses::param_status("integer_datetimes", "on"));
    buffers.queue_response(&responses::param_status(
        "standard_conforming_strings",
        "on",
    ));

    buffers.queue_response(&responses::backend_key_data(context.backend_identity));
    buffers.queue_response(&responses::ready_with_status(ReadyStatus::Idle));
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
