use std::ops::Range;

use crate::wire::utils::{ReadCStrError, read_cstr_take};

// -----------------------------------------------------------------------------
// ----- QueryFrameObserver ----------------------------------------------------

/// Zero-copy view over a simple-query ('Q') frame.
#[derive(Clone, Copy, Debug)]
pub struct QueryFrameObserver<'a> {
    query: &'a str,
    query_start: usize,
}

// -----------------------------------------------------------------------------
// ----- QueryFrameObserver: Static --------------------------------------------

impl<'a> QueryFrameObserver<'a> {
    /// Validate a complete frame slice: tag, length and a single NUL-terminated body.
    pub fn new(frame: &'a [u8]) -> Result<Self, NewQueryObserverError> {
        if frame.len() < 5 || frame[0] != b'Q' {
            return Err(NewQueryObserverError::UnexpectedTag(
                frame.first().copied().unwrap_or(0),
            ));
        }

        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        if frame.len() != 1 + len {
            return Err(NewQueryObserverError::UnexpectedLength);
        }

        let query_start = 5;
        let (query, rest) = read_cstr_take(&frame[query_start..])?;
        if !rest.is_empty() {
            return Err(NewQueryObserverError::UnexpectedLength);
        }

        Ok(Self { query, query_start })
    }
}

// -----------------------------------------------------------------------------
// ----- QueryFrameObserver: Public --------------------------------------------

impl<'a> QueryFrameObserver<'a> {
    #[inline]
    pub fn query(&self) -> &'a str {
        self.query
    }

    /// Byte range of the query text inside the frame, terminator excluded.
    #[inline]
    pub fn query_span(&self) -> Range<usize> {
        self.query_start..self.query_start + self.query.len()
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NewQueryObserverError {
    #[error("query text: {0}")]
    Text(#[from] ReadCStrError),

    #[error("unexpected length")]
    UnexpectedLength,

    #[error("unexpected tag: {0:#X}")]
    UnexpectedTag(u8),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
