use crate::wire::utils::{ReadCStrError, read_cstr_take};

// -----------------------------------------------------------------------------
// ----- PasswordMessageFrameObserver ------------------------------------------

#[derive(Clone, Copy, Debug)]
pub struct PasswordMessageFrameObserver<'a> {
    password: &'a str,
}

impl<'a> PasswordMessageFrameObserver<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self, NewPasswordMessageObserverError> {
        if frame.len() < 5 || frame[0] != b'p' {
            return Err(NewPasswordMessageObserverError::UnexpectedTag(
                frame.first().copied().unwrap_or(0),
            ));
        }

        let len = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]) as usize;
        if frame.len() != 1 + len {
            return Err(NewPasswordMessageObserverError::UnexpectedLength);
        }

        let (password, rest) = read_cstr_take(&frame[5..])?;
        if !rest.is_empty() {
            return Err(NewPasswordMessageObserverError::UnexpectedLength);
        }

        Ok(Self { password })
    }

    pub fn password(&self) -> &'a str {
        self.password
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NewPasswordMessageObserverError {
    #[error("password: {0}")]
    Text(#[from] ReadCStrError),

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

    #[test]
    fn reads_password() {
        let frame = [b'p', 0, 0, 0, 12, b'h', b'u', b'n', b't', b'e', b'r', b'2', 0];
        let obs = PasswordMessageFrameObserver::new(&frame).unwrap();
        assert_eq!(obs.password(), "hunter2");
    }

    #[test]
    fn rejects_missing_terminator() {
        let frame = [b'p', 0, 0, 0, 6, b'a', b'b'];
        let err = PasswordMessageFrameObserver::new(&frame).unwrap_err();
        assert!(matches!(
            err,
            NewPasswordMessageObserverError::Text(ReadCStrError::UnexpectedEof)
        ));
    }
}
