//! Splits the client byte stream into length-prefixed protocol units.
//!
//! The framer never looks past the 5-byte header: tag + big-endian length
//! (length includes itself, not the tag). Payload semantics belong to the
//! observers and the interception layer.

use bytes::BytesMut;
use thiserror::Error;

use super::types::MessageType;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const HEADER_LEN: usize = 5;

// PostgreSQL refuses anything at or above 1 GiB.
const MAX_FRAME_LEN: u32 = 0x3FFF_FFFF;

const MIN_STARTUP_LEN: u32 = 8;
const MAX_STARTUP_LEN: u32 = 10_000;

const SCRATCH_CAPACITY_HINT: usize = 4096;

// -----------------------------------------------------------------------------
// ----- FrameHeader -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: MessageType,
    pub declared_len: u32,
    pub total_len: usize,
}

// -----------------------------------------------------------------------------
// ----- ProtocolUnit ----------------------------------------------------------

/// One complete frame, tag and length included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolUnit {
    message_type: MessageType,
    declared_len: u32,
    frame: BytesMut,
    offset: u64,
}

impl ProtocolUnit {
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    #[inline]
    pub fn declared_len(&self) -> u32 {
        self.declared_len
    }

    /// Position of the tag byte within the session's client stream.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.frame
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.frame[HEADER_LEN..]
    }

    pub fn into_bytes(self) -> BytesMut {
        self.frame
    }

    pub(crate) fn frame_mut(&mut self) -> &mut BytesMut {
        &mut self.frame
    }

    /// Rewrites the length field from the current frame size.
    pub(crate) fn sync_length_field(&mut self) {
        let declared = (self.frame.len() - 1) as u32;
        self.frame[1..HEADER_LEN].copy_from_slice(&declared.to_be_bytes());
        self.declared_len = declared;
    }
}

// -----------------------------------------------------------------------------
// ----- MessageFramer ---------------------------------------------------------

#[derive(Debug)]
pub struct MessageFramer {
    stream: BytesMut,
    offset: u64,
}

// -----------------------------------------------------------------------------
// ----- MessageFramer: Static -------------------------------------------------

impl MessageFramer {
    pub fn new() -> Self {
        Self {
            stream: BytesMut::with_capacity(SCRATCH_CAPACITY_HINT),
            offset: 0,
        }
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- MessageFramer: Public -------------------------------------------------

impl MessageFramer {
    /// Read target for the transport. Reserves scratch room first.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        self.stream.reserve(SCRATCH_CAPACITY_HINT);
        &mut self.stream
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.stream.extend_from_slice(bytes);
    }

    /// Bytes received but not yet handed out as units.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.stream.len()
    }

    /// Total bytes consumed from the stream so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn peek_header(&self) -> Result<Option<FrameHeader>, FrameError> {
        if self.stream.len() < HEADER_LEN {
            return Ok(None);
        }

        let tag = self.stream[0];
        let declared_len = be_u32(&self.stream[1..]);

        if declared_len < 4 {
            return Err(FrameError::InvalidLength {
                tag: char::from(tag),
                declared: declared_len,
                offset: self.offset,
            });
        }

        if declared_len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge {
                tag: char::from(tag),
                declared: declared_len,
                offset: self.offset,
            });
        }

        Ok(Some(FrameHeader {
            message_type: MessageType::from_tag(tag),
            declared_len,
            total_len: 1 + declared_len as usize,
        }))
    }

    pub fn next_unit(&mut self) -> Result<Option<ProtocolUnit>, FrameError> {
        let Some(header) = self.peek_header()? else {
            return Ok(None);
        };

        if self.stream.len() < header.total_len {
            return Ok(None);
        }

        let frame = self.stream.split_to(header.total_len);
        let offset = self.offset;
        self.offset += header.total_len as u64;

        Ok(Some(ProtocolUnit {
            message_type: header.message_type,
            declared_len: header.declared_len,
            frame,
            offset,
        }))
    }

    /// Up to `max` raw bytes, frame boundaries ignored. For streaming the
    /// rest of a frame whose header was already seen.
    pub fn take_up_to(&mut self, max: usize) -> BytesMut {
        let n = max.min(self.stream.len());
        self.offset += n as u64;
        self.stream.split_to(n)
    }

    /// Untagged startup-phase packets (Startup, SSLRequest, CancelRequest, ...).
    pub fn next_untagged(&mut self) -> Result<Option<BytesMut>, FrameError> {
        if self.stream.len() < 4 {
            return Ok(None);
        }

        let declared = be_u32(&self.stream[0..]);
        if !(MIN_STARTUP_LEN..=MAX_STARTUP_LEN).contains(&declared) {
            return Err(FrameError::InvalidStartupLength {
                declared,
                offset: self.offset,
            });
        }

        let total = declared as usize;
        if self.stream.len() < total {
            return Ok(None);
        }

        self.offset += total as u64;
        Ok(Some(self.stream.split_to(total)))
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid length {declared} in '{tag}' frame at offset {offset}")]
    InvalidLength { tag: char, declared: u32, offset: u64 },

    #[error("'{tag}' frame of {declared} bytes at offset {offset} exceeds the protocol limit")]
    TooLarge { tag: char, declared: u32, offset: u64 },

    #[error("invalid startup packet length {declared} at offset {offset}")]
    InvalidStartupLength { declared: u32, offset: u64 },
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
