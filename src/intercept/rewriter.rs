//! Splices rewritten text into a statement's frame.
//!
//! For Parse units only the query string moves; the statement name and the
//! parameter type OIDs are kept byte for byte.

use thiserror::Error;

use super::assembler::Statement;

// -----------------------------------------------------------------------------
// ----- Rewrite ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewritten {
    pub old_len: usize,
    pub new_len: usize,
}

/// Replace the statement text with `new_text`, provided the resulting frame
/// fits in `capacity` bytes. On error the statement is left untouched.
pub fn rewrite_statement(
    statement: &mut Statement,
    new_text: &str,
    capacity: usize,
) -> Result<Rewritten, RewriteError> {
    let span = statement.text.clone().ok_or(RewriteError::NoText)?;

    let old_len = statement.unit.len();
    let new_len = old_len - span.len() + new_text.len();
    if new_len > capacity {
        return Err(RewriteError::Overflow {
            required: new_len,
            capacity,
        });
    }

    let frame = statement.unit.frame_mut();
    let tail = frame.split_off(span.end);
    frame.truncate(span.start);
    frame.reserve(new_text.len() + tail.len());
    frame.extend_from_slice(new_text.as_bytes());
    frame.extend_from_slice(&tail);

    statement.unit.sync_length_field();
    statement.text = Some(span.start..span.start + new_text.len());

    Ok(Rewritten { old_len, new_len })
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("rewritten statement needs {required} bytes, buffer capacity is {capacity}")]
    Overflow { required: usize, capacity: usize },

    #[error("statement has no text to rewrite")]
    NoText,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
