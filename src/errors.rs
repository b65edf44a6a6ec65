use bytes::{BufMut, Bytes, BytesMut};

// -----------------------------------------------------------------------------
// ----- ErrorResponse ---------------------------------------------------------

/// Backend 'E' frame the proxy sends on its own behalf.
#[derive(Clone, Debug, Default)]
pub struct ErrorResponse {
    pub severity: Severity, // S
    pub code: &'static str, // C (SQLSTATE 5-char)
    pub message: String,    // M

    pub detail: Option<String>, // D
    pub hint: Option<String>,   // H
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Static -------------------------------------------------

impl ErrorResponse {
    pub fn new(severity: Severity, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "XX000", message)
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "08P01", message)
    }

    pub fn invalid_password(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "28P01", message)
    }

    pub fn invalid_catalog(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "3D000", message)
    }

    pub fn connection_failure(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, "08006", message)
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Builder ------------------------------------------------

impl ErrorResponse {
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Public -------------------------------------------------

impl ErrorResponse {
    /// Build the backend 'E' frame. Returns a complete wire buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128);

        buf.put_u8(b'E');
        buf.put_u32(0); // length placeholder

        put_field(&mut buf, b'S', self.severity.as_str());
        put_field(&mut buf, b'V', self.severity.as_str());
        put_field(&mut buf, b'C', self.code);
        put_field(&mut buf, b'M', &self.message);

        if let Some(v) = self.detail.as_deref() {
            put_field(&mut buf, b'D', v);
        }

        if let Some(v) = self.hint.as_deref() {
            put_field(&mut buf, b'H', v);
        }

        buf.put_u8(0); // terminator

        let len = (buf.len() - 1) as u32;
        buf[1..5].copy_from_slice(&len.to_be_bytes());

        buf.freeze()
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Severity -----------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Severity {
    #[default]
    Error,
    Fatal,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

#[inline]
fn put_field(buf: &mut BytesMut, tag: u8, val: &str) {
    buf.put_u8(tag);
    buf.extend_from_slice(val.as_bytes());
    buf.put_u8(0);
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
