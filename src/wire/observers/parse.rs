use std::ops::Range;

use crate::wire::utils::{ReadCStrError, read_cstr_take};

// -----------------------------------------------------------------------------
// ----- ParseFrameObserver ----------------------------------------------------

/// Zero-copy view over an extended-protocol Parse ('P') frame:
/// statement name, query text, then Int16 count + Int32 parameter type OIDs.
/// Only the query text is exposed; the rest is validated and left in place.
#[derive(Clone, Copy, Debug)]
pub struct ParseFrameObserver<'a> {
    query: &'a str,
    query_start: usize,
}

// -----------------------------------------------------------------------------
// ----- ParseFrameObserver: Static --------------------------------------------

impl<'a> ParseFrameObserver<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, NewParseObserverError> {
        if frame.len() < 5 || frame[0] != b'P' {
            return Err(NewParseObserverError::UnexpectedTag(
                frame.first().copied().unwrap_or(0),
            ));
        }

        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        let total = 1 + len;
        if frame.len() != total {
            return Err(NewParseObserverError::UnexpectedLength);
        }

        let (statement, rest) = read_cstr_take(&frame[5..])?;
        let query_start = 5 + statement.len() + 1;
        let (query, rest) = read_cstr_take(rest)?;

        if rest.len() < 2 {
            return Err(NewParseObserverError::UnexpectedEof);
        }
        let signed_count = i16::from_be_bytes([rest[0], rest[1]]);
        if signed_count < 0 {
            return Err(NewParseObserverError::InvalidCount(signed_count));
        }

        let param_type_count = signed_count as usize;
        let param_type_oids_start = total - rest.len() + 2;
        if param_type_oids_start + 4 * param_type_count != total {
            return Err(NewParseObserverError::UnexpectedLength);
        }

        Ok(Self { query, query_start })
    }
}

// -----------------------------------------------------------------------------
// ----- ParseFrameObserver: Public --------------------------------------------

impl<'a> ParseFrameObserver<'a> {
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
pub enum NewParseObserverError {
    #[error("invalid parameter count: {0}")]
    InvalidCount(i16),

    #[error("parse text: {0}")]
    Text(#[from] ReadCStrError),

    #[error("unexpected EOF")]
    UnexpectedEof,

    #[error("unexpected length")]
    UnexpectedLength,

    #[error("unexpected tag: {0:#X}")]
    UnexpectedTag(u8),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn build_frame(statement: &str, query: &str, param_oids: &[i32]) -> Vec<u8> {
        let mut body = BytesMut::new();
        body.extend_from_slice(statement.as_bytes());
        body.put_u8(0);
        body.extend_from_slice(query.as_bytes());
        body.put_u8(0);
        body.put_i16(param_oids.len() as i16);
        for &oid in param_oids {
            body.put_i32(oid);
        }
        let mut frame = BytesMut::new();
        frame.put_u8(b'P');
        frame.put_u32((4 + body.len()) as u32);
        frame.extend_from_slice(&body);
        frame.to_vec()
    }

    #[test]
    fn unnamed_statement_without_params() {
        let frame = build_frame("", "SELECT 1", &[]);
        let obs = ParseFrameObserver::new(&frame).unwrap();
        assert_eq!(obs.query(), "SELECT 1");
        assert_eq!(&frame[obs.query_span()], b"SELECT 1");
        assert_eq!(obs.query_span().start, 6);
    }

    #[test]
    fn named_statement_with_params() {
        let frame = build_frame("s1", "SELECT $1, $2", &[23, 25]);
        let obs = ParseFrameObserver::new(&frame).unwrap();
        assert_eq!(&frame[obs.query_span()], b"SELECT $1, $2");
        assert_eq!(&frame[5..obs.query_span().start], b"s1\0");
        assert_eq!(&frame[frame.len() - 8..], &[0, 0, 0, 23, 0, 0, 0, 25]);
    }

    #[test]
    fn negative_count_rejected() {
        let mut frame = build_frame("", "SELECT 1", &[]);
        let n = frame.len();
        frame[n - 2..].copy_from_slice(&(-1i16).to_be_bytes());
        let err = ParseFrameObserver::new(&frame).unwrap_err();
        assert!(matches!(err, NewParseObserverError::InvalidCount(-1)));
    }

    #[test]
    fn missing_oids_rejected() {
        let mut frame = build_frame("", "SELECT $1", &[23]);
        frame.truncate(frame.len() - 4);
        let len = (frame.len() - 1) as u32;
        frame[1..5].copy_from_slice(&len.to_be_bytes());
        let err = ParseFrameObserver::new(&frame).unwrap_err();
        assert!(matches!(err, NewParseObserverError::UnexpectedLength));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
