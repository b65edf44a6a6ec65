use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::frontend::FrontendConnection;
use crate::gateway::{GatewayPools, PoolStats};
use crate::intercept::DecisionDispatcher;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const LISTEN_BACKLOG: u32 = 1024;

// -----------------------------------------------------------------------------
// ----- Server ----------------------------------------------------------------

/// Process-wide state every client session borrows: configuration, the
/// server pools and the decision capabilities.
#[derive(Debug, Clone)]
pub struct Server {
    config: Arc<Config>,
    pools: Arc<GatewayPools>,
    dispatcher: Arc<DecisionDispatcher>,
}

// -----------------------------------------------------------------------------
// ----- Server: Static --------------------------------------------------------

impl Server {
    pub fn new(config: Arc<Config>) -> Self {
        let pools = Arc::new(GatewayPools::new(&config.pools));
        let dispatcher = Arc::new(DecisionDispatcher::from_config(&config.intercept));

        info!(
            pools = config.pools.len(),
            routing = dispatcher.routing_enabled(),
            rewrite = dispatcher.rewrite_enabled(),
            failure_policy = config.intercept.failure_policy.as_str(),
            buffer_capacity = config.intercept.buffer_capacity,
            "interception configured"
        );

        Self {
            config,
            pools,
            dispatcher,
        }
    }

    /// Swap in programmatic capabilities in place of the configured ones.
    pub fn with_dispatcher(mut self, dispatcher: DecisionDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }
}

// -----------------------------------------------------------------------------
// ----- Server: Public --------------------------------------------------------

impl Server {
    pub fn bind(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(LISTEN_BACKLOG)
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.snapshot()
    }

    /// Opens `min_connections` per pool. Failures are logged, not fatal.
    pub async fn warm_pools(&self) {
        self.pools.warm_all().await;
    }

    /// Accepts clients until `shutdown` resolves. Sessions already running
    /// are left to finish on their own.
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> io::Result<()> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down listener");
                    return Ok(());
                }

                accept_res = listener.accept() => {
                    let (stream, peer) = match accept_res {
                        Ok(v) => v,
                        Err(e) => { error!("accept error: {e}"); continue; }
                    };

                    let _ = stream.set_nodelay(true);
                    debug!(%peer, "client connected");

                    let conn = FrontendConnection::new(
                        stream,
                        Arc::clone(&self.config),
                        Arc::clone(&self.pools),
                        Arc::clone(&self.dispatcher),
                    );

                    tokio::spawn(async move {
                        let reason = conn.serve().await;
                        debug!(%peer, reason = reason.as_str(), "session closed");
                    });
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
