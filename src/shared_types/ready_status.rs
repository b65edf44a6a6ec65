// -----------------------------------------------------------------------------
// ----- ReadyStatus -----------------------------------------------------------

/// The ReadyForQuery transaction status byte. The proxy emits it after login
/// and reads it from backends to know when a lease may be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyStatus {
    Idle,
    InTransaction,
    FailedTransaction,
}

// -----------------------------------------------------------------------------
// ----- ReadyStatus: Static ---------------------------------------------------

impl ReadyStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(ReadyStatus::Idle),
            b'T' => Some(ReadyStatus::InTransaction),
            b'E' => Some(ReadyStatus::FailedTransaction),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ReadyStatus: Public ---------------------------------------------------

impl ReadyStatus {
    pub fn as_byte(self) -> u8 {
        match self {
            ReadyStatus::Idle => b'I',
            ReadyStatus::InTransaction => b'T',
            ReadyStatus::FailedTransaction => b'E',
        }
    }

    /// Inside a transaction block, failed or not.
    #[inline]
    pub fn in_transaction(self) -> bool {
        !matches!(self, ReadyStatus::Idle)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
