use smallvec::SmallVec;

use crate::wire::utils::{ReadCStrError, read_cstr};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const PROTOCOL_VERSION: i32 = 196608; // 3.0
const CANCEL_REQUEST_CODE: i32 = 80877102;
const SSL_REQUEST_CODE: i32 = 80877103;
const GSSENC_REQUEST_CODE: i32 = 80877104;

const INLINE_PARAMS: usize = 8;

// -----------------------------------------------------------------------------
// ----- StartupKind -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupKind {
    Startup,
    SslRequest,
    GssEncRequest,
    CancelRequest,
}

// -----------------------------------------------------------------------------
// ----- StartupPacketObserver -------------------------------------------------

/// View over one untagged startup-phase packet (length + code + body).
#[derive(Clone, Debug)]
pub struct StartupPacketObserver<'a> {
    kind: StartupKind,
    params: SmallVec<[(&'a str, &'a str); INLINE_PARAMS]>,
}

// -----------------------------------------------------------------------------
// ----- StartupPacketObserver: Static -----------------------------------------

impl<'a> StartupPacketObserver<'a> {
    pub fn new(packet: &'a [u8]) -> Result<Self, NewStartupObserverError> {
        if packet.len() < 8 {
            return Err(NewStartupObserverError::UnexpectedLength);
        }

        let len = be_i32(&packet[0..]) as usize;
        if packet.len() != len {
            return Err(NewStartupObserverError::UnexpectedLength);
        }

        let kind = match be_i32(&packet[4..]) {
            PROTOCOL_VERSION => StartupKind::Startup,
            SSL_REQUEST_CODE => StartupKind::SslRequest,
            GSSENC_REQUEST_CODE => StartupKind::GssEncRequest,
            CANCEL_REQUEST_CODE => StartupKind::CancelRequest,
            other => return Err(NewStartupObserverError::UnexpectedVersion(other)),
        };

        let mut params = SmallVec::new();
        if kind == StartupKind::Startup {
            let mut input = &packet[8..];
            loop {
                let key = read_cstr(&mut input)?;
                if key.is_empty() {
                    break;
                }
                let value = read_cstr(&mut input)?;
                params.push((key, value));
            }

            if !input.is_empty() {
                return Err(NewStartupObserverError::UnexpectedLength);
            }
        }

        Ok(Self { kind, params })
    }
}

// -----------------------------------------------------------------------------
// ----- StartupPacketObserver: Public -----------------------------------------

impl<'a> StartupPacketObserver<'a> {
    #[inline]
    pub fn kind(&self) -> StartupKind {
        self.kind
    }

    pub fn param(&self, key: &str) -> Option<&'a str> {
        self.params
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| *value)
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NewStartupObserverError {
    #[error("startup parameter: {0}")]
    Text(#[from] ReadCStrError),

    #[error("unexpected length")]
    UnexpectedLength,

    #[error("unexpected version: {0}")]
    UnexpectedVersion(i32),
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn be_i32(x: &[u8]) -> i32 {
    i32::from_be_bytes([x[0], x[1], x[2], x[3]])
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
