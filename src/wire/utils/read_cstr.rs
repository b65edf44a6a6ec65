//! Read a NUL-terminated UTF-8 string from the front of a byte slice.

use memchr::memchr;
use std::str;

// -----------------------------------------------------------------------------
// ----- read_cstr (mutates input) ---------------------------------------------

/// Returns the string before the first NUL and advances `input_bytes` past it.
#[inline]
pub fn read_cstr<'a>(input_bytes: &mut &'a [u8]) -> Result<&'a str, ReadCStrError> {
    let (parsed, remainder) = read_cstr_take(input_bytes)?;
    *input_bytes = remainder;
    Ok(parsed)
}

// -----------------------------------------------------------------------------
// ----- read_cstr_take (returns remainder) ------------------------------------

#[inline]
pub fn read_cstr_take(input_bytes: &[u8]) -> Result<(&str, &[u8]), ReadCStrError> {
    let nul_index = memchr(0, input_bytes).ok_or(ReadCStrError::UnexpectedEof)?;

    let (bytes_before_nul, bytes_from_nul) = input_bytes.split_at(nul_index);
    let parsed = str::from_utf8(bytes_before_nul)?;

    Ok((parsed, &bytes_from_nul[1..]))
}

// -----------------------------------------------------------------------------
// ----- Error -----------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ReadCStrError {
    #[error("unexpected EOF")]
    UnexpectedEof,

    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] str::Utf8Error),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
