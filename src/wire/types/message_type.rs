//! v3 frontend Byte1 tags seen once a session is past authentication.
//! Only the tags the interception layer cares about get their own variant.

// -----------------------------------------------------------------------------
// ----- MessageType -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Bind,      // 'B'
    Close,     // 'C'
    Describe,  // 'D'
    Execute,   // 'E'
    Flush,     // 'H'
    Parse,     // 'P'
    Query,     // 'Q'
    Sync,      // 'S'
    Terminate, // 'X'

    // Anything else (CopyData, FunctionCall, ...) is forwarded untouched.
    Other(u8),
}

// -----------------------------------------------------------------------------
// ----- MessageType: Static ---------------------------------------------------

impl MessageType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            b'B' => MessageType::Bind,
            b'C' => MessageType::Close,
            b'D' => MessageType::Describe,
            b'E' => MessageType::Execute,
            b'H' => MessageType::Flush,
            b'P' => MessageType::Parse,
            b'Q' => MessageType::Query,
            b'S' => MessageType::Sync,
            b'X' => MessageType::Terminate,
            other => MessageType::Other(other),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- MessageType: Public ---------------------------------------------------

impl MessageType {
    pub fn tag(self) -> u8 {
        match self {
            MessageType::Bind => b'B',
            MessageType::Close => b'C',
            MessageType::Describe => b'D',
            MessageType::Execute => b'E',
            MessageType::Flush => b'H',
            MessageType::Parse => b'P',
            MessageType::Query => b'Q',
            MessageType::Sync => b'S',
            MessageType::Terminate => b'X',
            MessageType::Other(tag) => tag,
        }
    }

    /// Query and Parse carry statement text of their own; they are the only
    /// units that can be routed or rewritten.
    #[inline]
    pub fn is_statement(self) -> bool {
        matches!(self, MessageType::Query | MessageType::Parse)
    }

    /// Units after which the backend answers with ReadyForQuery.
    #[inline]
    pub fn expects_ready(self) -> bool {
        matches!(self, MessageType::Query | MessageType::Sync)
    }

    /// Extended-protocol units whose implicit transaction stays open on the
    /// backend until the next Sync.
    #[inline]
    pub fn opens_extended(self) -> bool {
        matches!(
            self,
            MessageType::Parse
                | MessageType::Bind
                | MessageType::Describe
                | MessageType::Execute
                | MessageType::Close
        )
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
