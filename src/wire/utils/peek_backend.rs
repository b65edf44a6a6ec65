// -----------------------------------------------------------------------------
// ----- peek_backend ----------------------------------------------------------

/// Peeks at the next backend frame. `Ok(Some((tag, total_len)))` once the
/// whole frame is buffered, `Ok(None)` while more bytes are needed.
pub fn peek_backend(bytes: &[u8]) -> Result<Option<(u8, usize)>, InvalidBackendFrame> {
    if bytes.len() < 5 {
        return Ok(None);
    }

    let tag = bytes[0];
    let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if len < 4 {
        return Err(InvalidBackendFrame { tag, len });
    }

    let total = 1 + len;
    if bytes.len() < total {
        return Ok(None);
    }

    Ok(Some((tag, total)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("backend sent '{}' frame with invalid length {len}", char::from(*tag))]
pub struct InvalidBackendFrame {
    pub tag: u8,
    pub len: usize,
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
