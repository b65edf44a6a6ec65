use bytes::BytesMut;
use tracing::debug;

use crate::config::Config;
use crate::errors::ErrorResponse;
use crate::frontend::buffers::FrontendBuffers;
use crate::frontend::context::{DisconnectReason, FrontendContext};
use crate::frontend::proxy_responses as responses;
use crate::shared_types::AuthStage;
use crate::wire::observers::startup::NewStartupObserverError;
use crate::wire::observers::{StartupKind, StartupPacketObserver};

// -----------------------------------------------------------------------------
// ----- Startup Handler -------------------------------------------------------

pub(crate) fn handle_startup(
    context: &mut FrontendContext,
    buffers: &mut FrontendBuffers,
    config: &Config,
    packet: BytesMut,
) {
    let startup = match StartupPacketObserver::new(&packet) {
        Ok(startup) => startup,
        Err(NewStartupObserverError::UnexpectedVersion(version)) => {
            let err = ErrorResponse::protocol_violation("unsupported startup protocol version")
                .with_detail(format!("version: {version}"));
            reject(context, buffers, err);
            return;
        }
        Err(_) => {
            reject(
                context,
                buffers,
                ErrorResponse::protocol_violation("bad startup message"),
            );
            return;
        }
    };

    match startup.kind() {
        // No TLS or GSS encryption: answer 'N' and stay in Startup, the
        // client follows up with a plain StartupMessage.
        StartupKind::SslRequest => buffers.queue_response(&responses::ssl_no()),
        StartupKind::GssEncRequest => buffers.queue_response(&responses::gssenc_no()),

        StartupKind::CancelRequest => {
            debug!("cancel request ignored");
            context.request_close(DisconnectReason::ClientClosed);
        }

        StartupKind::Startup => {
            let Some(username) = startup.param("user").filter(|v| !v.is_empty()) else {
                reject(
                    context,
                    buffers,
                    ErrorResponse::protocol_violation("startup missing user"),
                );
                return;
            };

            let database = startup
                .param("database")
                .filter(|v| !v.is_empty())
                .unwrap_or(username);

            if !config.pools.contains(database) {
                let err = ErrorResponse::invalid_catalog(format!(
                    "database \"{database}\" does not exist"
                ));
                reject(context, buffers, err);
                return;
            }

            context.username = Some(username.to_string());
            context.database = Some(database.to_string());
            context.stage = AuthStage::Authenticating;

            buffers.queue_response(&responses::auth_cleartext());
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn reject(context: &mut FrontendContext, buffers: &mut FrontendBuffers, err: ErrorResponse) {
    buffers.queue_response(&err.to_bytes());
    context.request_close(DisconnectReason::StartupRejected(err.message));
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
