use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

use crate::wire::MessageFramer;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const READ_CAPACITY_HINT: usize = 4096;

// -----------------------------------------------------------------------------
// ----- FrontendBuffers -------------------------------------------------------

/// Client bytes not yet consumed, and proxy-generated responses not yet
/// handed to the writer task.
#[derive(Debug, Default)]
pub(crate) struct FrontendBuffers {
    pub(crate) framer: MessageFramer,
    outbox: BytesMut,
}

impl FrontendBuffers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn read_from(&mut self, reader: &mut OwnedReadHalf) -> std::io::Result<usize> {
        let inbox = self.framer.buffer_mut();
        inbox.reserve(READ_CAPACITY_HINT);
        reader.read_buf(inbox).await
    }

    pub(crate) fn queue_response(&mut self, response: &[u8]) {
        self.outbox.extend_from_slice(response);
    }

    pub(crate) fn take_outbox(&mut self) -> Option<Bytes> {
        if self.outbox.is_empty() {
            return None;
        }
        Some(self.outbox.split().freeze())
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
