//! The narrow seam between interception and the pooling engine.

use bytes::BytesMut;
use std::io;
use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- Forwarder -------------------------------------------------------------

#[allow(async_fn_in_trait)]
pub trait Forwarder {
    /// Whether `key` names a configured server pool.
    fn is_valid_pool_key(&self, key: &str) -> bool;

    /// Send one complete unit to `pool_key` on behalf of `identity`. Units
    /// for one session arrive in client order.
    async fn forward(
        &mut self,
        identity: &str,
        pool_key: &str,
        bytes: BytesMut,
    ) -> Result<(), ForwardError>;

    /// Send raw bytes that continue the unit last passed to `forward`. Only
    /// overflowed statements arrive this way.
    async fn forward_continuation(
        &mut self,
        pool_key: &str,
        bytes: BytesMut,
    ) -> Result<(), ForwardError>;

    /// The pool whose backend is currently inside a transaction on behalf of
    /// this session, or holds extended-protocol units not yet closed by Sync.
    /// May wait for outstanding responses to settle.
    async fn pinned_pool(&mut self) -> Result<Option<String>, ForwardError>;
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("pool '{0}' is not configured")]
    UnknownPool(String),

    #[error("no connection from pool '{pool}': {reason}")]
    Acquire { pool: String, reason: String },

    #[error("backend i/o: {0}")]
    Io(#[from] io::Error),

    #[error("backend protocol: {0}")]
    Backend(String),

    #[error("client writer closed")]
    ClientGone,
}
