use std::sync::Arc;

use bytes::Bytes;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ErrorResponse;
use crate::gateway::{BackendLink, GatewayPools};
use crate::intercept::{DecisionDispatcher, ForwardError, InterceptSession, Pump, SessionError};
use crate::shared_types::AuthStage;

use super::buffers::FrontendBuffers;
use super::context::{DisconnectReason, FrontendContext};
use super::handlers::{handle_authenticating, handle_startup};

// -----------------------------------------------------------------------------
// ----- FrontendConnection ----------------------------------------------------

/// One client session: handshake handled locally, then every statement
/// goes through interception before reaching a server pool.
pub struct FrontendConnection {
    config: Arc<Config>,
    pools: Arc<GatewayPools>,
    dispatcher: Arc<DecisionDispatcher>,

    context: FrontendContext,
    buffers: FrontendBuffers,
    ready: Option<ReadySession>,

    reader: OwnedReadHalf,
    async_writer: mpsc::UnboundedSender<Bytes>,
}

struct ReadySession {
    intercept: InterceptSession,
    link: BackendLink,
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Static --------------------------------------------

impl FrontendConnection {
    pub fn new(
        stream: TcpStream,
        config: Arc<Config>,
        pools: Arc<GatewayPools>,
        dispatcher: Arc<DecisionDispatcher>,
    ) -> Self {
        let (reader, writer) = stream.into_split();

        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Bytes>();
        spawn_writer_task(writer, writer_rx);

        Self {
            config,
            pools,
            dispatcher,
            context: FrontendContext::new(),
            buffers: FrontendBuffers::new(),
            ready: None,
            reader,
            async_writer: writer_tx,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Public --------------------------------------------

impl FrontendConnection {
    /// Runs the session to completion and reports why it ended.
    pub async fn serve(mut self) -> DisconnectReason {
        let reason = self.run().await;
        self.flush_outbox();
        self.log_disconnect(&reason);
        reason
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Private -------------------------------------------

impl FrontendConnection {
    async fn run(&mut self) -> DisconnectReason {
        loop {
            let leased = self.ready.as_ref().is_some_and(|r| r.link.is_leased());

            select! {
                // -- Client messages --
                read_res = self.buffers.read_from(&mut self.reader) => {
                    match read_res {
                        Ok(0) => return DisconnectReason::ClientClosed,
                        Ok(_) => {}
                        Err(e) => {
                            debug!(error = %e, "client read failed");
                            return DisconnectReason::ClientClosed;
                        }
                    }

                    if let Some(reason) = self.process_inbox().await {
                        return reason;
                    }
                }

                // -- Backend responses --
                backend_res = read_backend(self.ready.as_mut()), if leased => {
                    if let Err(e) = backend_res {
                        return self.backend_failed(e);
                    }
                }
            }

            if !self.flush_outbox() {
                return DisconnectReason::ClientClosed;
            }
        }
    }

    async fn process_inbox(&mut self) -> Option<DisconnectReason> {
        loop {
            match self.context.stage {
                AuthStage::Startup => match self.buffers.framer.next_untagged() {
                    Ok(Some(packet)) => {
                        handle_startup(&mut self.context, &mut self.buffers, &self.config, packet)
                    }
                    Ok(None) => return None,
                    Err(e) => return Some(self.protocol_corruption(e.to_string())),
                },

                AuthStage::Authenticating => match self.buffers.framer.next_unit() {
                    Ok(Some(unit)) => {
                        handle_authenticating(
                            &mut self.context,
                            &mut self.buffers,
                            &self.config,
                            unit,
                        );
                        if self.context.stage == AuthStage::Ready {
                            self.enter_ready();
                        }
                    }
                    Ok(None) => return None,
                    Err(e) => return Some(self.protocol_corruption(e.to_string())),
                },

                AuthStage::Ready => return self.pump_ready().await,
            }

            if let Some(reason) = self.context.take_close_reason() {
                return Some(reason);
            }
        }
    }

    fn enter_ready(&mut self) {
        let identity = self.context.username.as_deref().unwrap_or_default();
        let database = self.context.database.as_deref().unwrap_or_default();

        info!(
            user = identity,
            pool = database,
            mode = ?self.context.pooler_mode,
            "client authenticated"
        );

        self.ready = Some(ReadySession {
            intercept: InterceptSession::new(
                identity,
                database,
                &self.config.intercept,
                Arc::clone(&self.dispatcher),
            ),
            link: BackendLink::new(
                Arc::clone(&self.pools),
                self.context.pooler_mode,
                self.async_writer.clone(),
            ),
        });
    }

    async fn pump_ready(&mut self) -> Option<DisconnectReason> {
        let ready = self.ready.as_mut()?;

        let pumped = ready
            .intercept
            .pump(&mut self.buffers.framer, &mut ready.link)
            .await;

        match pumped {
            Ok(Pump::NeedMore) => match ready.link.flush().await {
                Ok(()) => None,
                Err(e) => Some(self.backend_failed(e)),
            },
            Ok(Pump::Terminated) => Some(DisconnectReason::ClientTerminate),
            // Units accepted ahead of the failing statement still run, and
            // their replies reach the client before the FATAL error.
            Err(e @ (SessionError::BufferOverflow { .. } | SessionError::DecisionFailure(_))) => {
                if let Err(fe) = ready.link.settle().await {
                    return Some(self.backend_failed(fe));
                }
                Some(self.session_failed(e))
            }
            Err(e) => Some(self.session_failed(e)),
        }
    }

    fn session_failed(&mut self, err: SessionError) -> DisconnectReason {
        match err {
            SessionError::ProtocolCorruption(e) => self.protocol_corruption(e.to_string()),
            e @ SessionError::BufferOverflow { .. } => {
                let detail = e.to_string();
                let error = ErrorResponse::internal_error("statement could not be intercepted")
                    .with_detail(detail.clone());
                self.buffers.queue_response(&error.to_bytes());
                DisconnectReason::PolicyOverflow(detail)
            }
            SessionError::DecisionFailure(e) => {
                let detail = e.to_string();
                let error = ErrorResponse::internal_error("statement could not be intercepted")
                    .with_detail(detail.clone());
                self.buffers.queue_response(&error.to_bytes());
                DisconnectReason::PolicyDecisionFailure(detail)
            }
            SessionError::Forward(e) => self.backend_failed(e),
        }
    }

    fn protocol_corruption(&mut self, detail: String) -> DisconnectReason {
        let error = ErrorResponse::protocol_violation("invalid frontend message")
            .with_detail(detail.clone());
        self.buffers.queue_response(&error.to_bytes());
        DisconnectReason::ProtocolCorruption(detail)
    }

    fn backend_failed(&mut self, err: ForwardError) -> DisconnectReason {
        if matches!(err, ForwardError::ClientGone) {
            return DisconnectReason::ClientClosed;
        }

        let detail = err.to_string();
        let error = ErrorResponse::connection_failure("server pool unavailable")
            .with_detail(detail.clone());
        self.buffers.queue_response(&error.to_bytes());
        DisconnectReason::BackendFailure(detail)
    }

    /// Hands queued proxy responses to the writer task. False once the
    /// writer is gone.
    fn flush_outbox(&mut self) -> bool {
        match self.buffers.take_outbox() {
            Some(bytes) => self.async_writer.send(bytes).is_ok(),
            None => true,
        }
    }

    fn log_disconnect(&self, reason: &DisconnectReason) {
        let user = self.context.username.as_deref().unwrap_or("-");
        let stats = self
            .ready
            .as_ref()
            .map(|r| r.intercept.stats())
            .unwrap_or_default();

        if reason.is_clean() {
            info!(
                user,
                reason = reason.as_str(),
                statements = stats.statements,
                reroutes = stats.reroutes,
                rewrites = stats.rewrites,
                "client disconnected"
            );
        } else {
            warn!(
                user,
                reason = reason.as_str(),
                detail = %reason,
                statements = stats.statements,
                reroutes = stats.reroutes,
                rewrites = stats.rewrites,
                "client disconnected"
            );
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn read_backend(ready: Option<&mut ReadySession>) -> Result<(), ForwardError> {
    match ready {
        Some(ready) => ready.link.read_backend().await,
        None => std::future::pending().await,
    }
}

fn spawn_writer_task(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(mut buf) = rx.recv().await {
            if writer.write_all_buf(&mut buf).await.is_err() {
                return;
            }

            // coalesce bursts to cut syscalls
            while let Ok(mut more) = rx.try_recv() {
                if writer.write_all_buf(&mut more).await.is_err() {
                    return;
                }
            }
        }

        let _ = writer.shutdown().await;
    });
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
