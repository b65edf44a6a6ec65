//! One session's view of the pools: at most one leased backend at a time,
//! client units queued for it, and the count of ReadyForQuery still owed.
//!
//! Extended-protocol units sent since the last Sync keep the backend pinned:
//! its implicit transaction and unnamed statement/portal live only there.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::backend_connection::ready_status;
use crate::config::PoolerMode;
use crate::intercept::{ForwardError, Forwarder};
use crate::wire::MessageType;
use crate::wire::utils::peek_backend;

use super::pool::{GatewayPools, PooledConnection};

// -----------------------------------------------------------------------------
// ----- BackendLink -----------------------------------------------------------

#[derive(Debug)]
pub struct BackendLink {
    pools: Arc<GatewayPools>,
    mode: PoolerMode,
    lease: Option<PooledConnection>,
    outbox: BytesMut,
    pending: usize,
    unsynced: bool,
    client: mpsc::UnboundedSender<Bytes>,
}

// -----------------------------------------------------------------------------
// ----- BackendLink: Static ---------------------------------------------------

impl BackendLink {
    pub fn new(
        pools: Arc<GatewayPools>,
        mode: PoolerMode,
        client: mpsc::UnboundedSender<Bytes>,
    ) -> Self {
        Self {
            pools,
            mode,
            lease: None,
            outbox: BytesMut::new(),
            pending: 0,
            unsynced: false,
            client,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- BackendLink: Public ---------------------------------------------------

impl BackendLink {
    #[inline]
    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    pub fn leased_pool(&self) -> Option<&str> {
        self.lease.as_ref().map(|lease| lease.dbkey())
    }

    /// Send queued client units to the leased backend.
    pub async fn flush(&mut self) -> Result<(), ForwardError> {
        if self.outbox.is_empty() {
            return Ok(());
        }

        let Some(lease) = self.lease.as_mut() else {
            return Err(ForwardError::Backend("units queued without a backend".into()));
        };

        let bytes = self.outbox.split();
        lease.connection().send(&bytes).await?;
        Ok(())
    }

    /// Wait for backend bytes and relay every complete frame to the client.
    /// Never resolves without a lease.
    pub async fn read_backend(&mut self) -> Result<(), ForwardError> {
        let Some(lease) = self.lease.as_mut() else {
            return std::future::pending().await;
        };

        let n = lease.connection().read().await?;
        if n == 0 {
            if let Some(lease) = self.lease.take() {
                lease.discard();
            }
            self.unsynced = false;
            return Err(ForwardError::Backend("backend closed the connection".into()));
        }

        self.relay()
    }

    /// Flush and wait until every outstanding response has been relayed.
    pub async fn settle(&mut self) -> Result<(), ForwardError> {
        self.flush().await?;
        while self.pending > 0 && self.lease.is_some() {
            self.read_backend().await?;
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- BackendLink: Private --------------------------------------------------

impl BackendLink {
    fn relay(&mut self) -> Result<(), ForwardError> {
        let Some(lease) = self.lease.as_mut() else {
            return Ok(());
        };
        let conn = lease.connection();

        let mut complete = 0;
        let mut saw_ready = false;
        while let Some((tag, total_len)) = peek_backend(&conn.buffer()[complete..])
            .map_err(|e| ForwardError::Backend(e.to_string()))?
        {
            if tag == b'Z' {
                if let Some(status) = ready_status(&conn.buffer()[complete..complete + total_len]) {
                    conn.set_status(status);
                }
                self.pending = self.pending.saturating_sub(1);
                saw_ready = true;
            }
            complete += total_len;
        }

        if complete > 0 {
            let frames = conn.take(complete).freeze();
            self.client
                .send(frames)
                .map_err(|_| ForwardError::ClientGone)?;
        }

        if saw_ready {
            self.release_if_idle();
        }
        Ok(())
    }

    // Transaction mode gives the backend back as soon as it is idle and
    // nothing is outstanding.
    fn release_if_idle(&mut self) {
        if self.mode != PoolerMode::Transaction
            || self.pending > 0
            || self.unsynced
            || !self.outbox.is_empty()
        {
            return;
        }

        let idle = self
            .lease
            .as_mut()
            .is_some_and(|lease| !lease.in_transaction() && lease.connection().buffer().is_empty());

        if idle {
            if let Some(lease) = self.lease.take() {
                debug!("released backend to pool {}", lease.dbkey());
            }
        }
    }

    async fn lease_for(&mut self, identity: &str, pool_key: &str) -> Result<(), ForwardError> {
        if self.leased_pool().is_some_and(|leased| leased != pool_key) {
            self.settle().await?;
            if let Some(previous) = self.lease.take() {
                debug!(user = identity, "leaving pool {} for {pool_key}", previous.dbkey());
                // Unsynced extended state cannot be handed to another session.
                if std::mem::take(&mut self.unsynced) {
                    previous.discard();
                }
            }
        }

        if self.lease.is_some() {
            return Ok(());
        }

        let pool = self
            .pools
            .get(pool_key)
            .ok_or_else(|| ForwardError::UnknownPool(pool_key.to_string()))?;

        let mut lease = pool.acquire().await.map_err(|e| ForwardError::Acquire {
            pool: pool_key.to_string(),
            reason: e.to_string(),
        })?;
        lease.reset_on_release(self.mode == PoolerMode::Session);

        debug!(user = identity, "leased backend from pool {pool_key}");
        self.lease = Some(lease);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- BackendLink: Forwarder ------------------------------------------------

impl Forwarder for BackendLink {
    fn is_valid_pool_key(&self, key: &str) -> bool {
        self.pools.contains(key)
    }

    async fn forward(
        &mut self,
        identity: &str,
        pool_key: &str,
        bytes: BytesMut,
    ) -> Result<(), ForwardError> {
        self.lease_for(identity, pool_key).await?;

        if let Some(tag) = bytes.first() {
            let kind = MessageType::from_tag(*tag);
            if kind.expects_ready() {
                self.pending += 1;
            }
            if kind.opens_extended() {
                self.unsynced = true;
            } else if kind == MessageType::Sync {
                self.unsynced = false;
            }
        }

        self.outbox.extend_from_slice(&bytes);
        Ok(())
    }

    async fn forward_continuation(
        &mut self,
        pool_key: &str,
        bytes: BytesMut,
    ) -> Result<(), ForwardError> {
        if self.leased_pool() != Some(pool_key) {
            return Err(ForwardError::Backend(format!(
                "continuation for pool '{pool_key}' without its backend"
            )));
        }

        self.outbox.extend_from_slice(&bytes);
        Ok(())
    }

    async fn pinned_pool(&mut self) -> Result<Option<String>, ForwardError> {
        self.settle().await?;

        let unsynced = self.unsynced;
        Ok(self
            .lease
            .as_ref()
            .filter(|lease| unsynced || lease.in_transaction())
            .map(|lease| lease.dbkey().to_string()))
    }
}

// -----------------------------------------------------------------------------
// ----- BackendLink: Drop -----------------------------------------------------

impl Drop for BackendLink {
    // A backend with responses still owed or an open extended exchange
    // cannot be reused safely.
    fn drop(&mut self) {
        if self.pending > 0 || self.unsynced || !self.outbox.is_empty() {
            if let Some(lease) = self.lease.take() {
                lease.discard();
            }
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
