use bytes::{Buf, BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::shared_types::ReadyStatus;
use crate::wire::utils::{InvalidBackendFrame, peek_backend};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const PROTOCOL_VERSION: u32 = 196608; // 3.0

const AUTH_OK: i32 = 0;
const AUTH_CLEARTEXT: i32 = 3;
const AUTH_MD5: i32 = 5;

const RESET_QUERY: &str = "DISCARD ALL";

// -----------------------------------------------------------------------------
// ----- BackendConnection -----------------------------------------------------

/// One authenticated server connection. The buffer holds backend bytes not
/// yet relayed to a client.
#[derive(Debug)]
pub struct BackendConnection {
    stream: TcpStream,
    buffer: BytesMut,
    status: ReadyStatus,
}

// -----------------------------------------------------------------------------
// ----- BackendConnection: Static ---------------------------------------------

impl BackendConnection {
    pub async fn connect(host: &str, port: u16) -> Result<Self, BackendError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(8192),
            status: ReadyStatus::Idle,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- BackendConnection: Public ---------------------------------------------

impl BackendConnection {
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await
    }

    pub async fn read(&mut self) -> io::Result<usize> {
        self.stream.read_buf(&mut self.buffer).await
    }

    pub fn buffer(&self) -> &[u8] {
        self.buffer.as_ref()
    }

    pub fn consume(&mut self, n: usize) {
        self.buffer.advance(n);
    }

    /// Detach the first `n` buffered bytes.
    pub fn take(&mut self, n: usize) -> BytesMut {
        self.buffer.split_to(n)
    }

    /// Status byte of the last ReadyForQuery seen on this connection.
    #[inline]
    pub fn status(&self) -> ReadyStatus {
        self.status
    }

    #[inline]
    pub fn set_status(&mut self, status: ReadyStatus) {
        self.status = status;
    }

    pub async fn startup(
        &mut self,
        user: &str,
        database: &str,
        password: &str,
    ) -> Result<(), BackendError> {
        self.send(&build_startup_message(user, database)).await?;

        let mut answered = false;
        loop {
            let Some((tag, total_len)) = self.next_frame().await? else {
                return Err(BackendError::Closed);
            };
            let frame = &self.buffer()[..total_len];

            match tag {
                b'R' => {
                    if frame.len() < 9 {
                        return Err(BackendError::Protocol("auth request too short".into()));
                    }
                    let code = i32::from_be_bytes([frame[5], frame[6], frame[7], frame[8]]);

                    let response = match code {
                        AUTH_OK => None,
                        AUTH_CLEARTEXT => Some(password.to_string()),
                        AUTH_MD5 => {
                            if frame.len() < 13 {
                                return Err(BackendError::Protocol("md5 salt missing".into()));
                            }
                            let salt = [frame[9], frame[10], frame[11], frame[12]];
                            Some(md5_password(user, password, salt))
                        }
                        other => return Err(BackendError::UnsupportedAuth(other)),
                    };

                    if let Some(response) = response {
                        if answered {
                            return Err(BackendError::Protocol(
                                "password requested twice".into(),
                            ));
                        }
                        if password.is_empty() {
                            return Err(BackendError::MissingPassword);
                        }
                        answered = true;
                        self.consume(total_len);
                        self.send(&build_password_message(&response)).await?;
                        continue;
                    }
                }
                b'E' => return Err(BackendError::Rejected(error_message(frame))),
                b'Z' => {
                    if let Some(status) = ready_status(frame) {
                        self.status = status;
                    }
                    self.consume(total_len);
                    return Ok(());
                }
                // ParameterStatus, BackendKeyData, NoticeResponse
                _ => {}
            }

            self.consume(total_len);
        }
    }

    /// Runs `DISCARD ALL` and waits for ReadyForQuery, leaving the connection
    /// clean for the next client.
    pub async fn reset_session(&mut self) -> Result<(), BackendError> {
        if self.status.in_transaction() {
            return Err(BackendError::Protocol(
                "reset requested inside a transaction".into(),
            ));
        }

        self.send(&build_query_message(RESET_QUERY)).await?;

        let mut failure = None;
        loop {
            let Some((tag, total_len)) = self.next_frame().await? else {
                return Err(BackendError::Closed);
            };
            let frame = &self.buffer()[..total_len];

            match tag {
                b'E' => failure = Some(error_message(frame)),
                b'Z' => {
                    if let Some(status) = ready_status(frame) {
                        self.status = status;
                    }
                    self.consume(total_len);
                    return match failure {
                        Some(message) => Err(BackendError::Rejected(message)),
                        None => Ok(()),
                    };
                }
                _ => {}
            }

            self.consume(total_len);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- BackendConnection: Private --------------------------------------------

impl BackendConnection {
    /// Reads until a whole frame is buffered. `None` on EOF.
    async fn next_frame(&mut self) -> Result<Option<(u8, usize)>, BackendError> {
        loop {
            if let Some(frame) = peek_backend(self.buffer())? {
                return Ok(Some(frame));
            }
            if self.read().await? == 0 {
                return Ok(None);
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Messages ----------------------------------------------------

fn build_startup_message(user: &str, database: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_u32(0);
    buf.put_u32(PROTOCOL_VERSION);
    for (key, value) in [("user", user), ("database", database)] {
        buf.extend_from_slice(key.as_bytes());
        buf.put_u8(0);
        buf.extend_from_slice(value.as_bytes());
        buf.put_u8(0);
    }
    buf.put_u8(0);
    let len = buf.len() as u32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    buf
}

fn build_password_message(password: &str) -> BytesMut {
    let payload_len = 4 + password.len() + 1;
    let mut buf = BytesMut::with_capacity(1 + payload_len);
    buf.put_u8(b'p');
    buf.put_u32(payload_len as u32);
    buf.extend_from_slice(password.as_bytes());
    buf.put_u8(0);
    buf
}

fn build_query_message(sql: &str) -> BytesMut {
    let payload_len = 4 + sql.len() + 1;
    let mut buf = BytesMut::with_capacity(1 + payload_len);
    buf.put_u8(b'Q');
    buf.put_u32(payload_len as u32);
    buf.extend_from_slice(sql.as_bytes());
    buf.put_u8(0);
    buf
}

// "md5" + md5(md5(password + user) + salt)
fn md5_password(user: &str, password: &str, salt: [u8; 4]) -> String {
    let inner = format!("{:x}", md5::compute(format!("{password}{user}")));

    let mut outer = md5::Context::new();
    outer.consume(inner.as_bytes());
    outer.consume(salt);

    format!("md5{:x}", outer.compute())
}

/// Status byte of a ReadyForQuery frame.
pub(crate) fn ready_status(frame: &[u8]) -> Option<ReadyStatus> {
    frame.get(5).copied().and_then(ReadyStatus::from_byte)
}

/// The 'M' field of an ErrorResponse frame.
fn error_message(frame: &[u8]) -> String {
    let mut fields = frame.get(5..).unwrap_or_default();
    while let Some((&code, rest)) = fields.split_first() {
        if code == 0 {
            break;
        }
        let end = memchr::memchr(0, rest).unwrap_or(rest.len());
        if code == b'M' {
            return String::from_utf8_lossy(&rest[..end]).into_owned();
        }
        fields = rest.get(end + 1..).unwrap_or_default();
    }
    "backend error".to_string()
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Frame(#[from] InvalidBackendFrame),

    #[error("backend closed the connection")]
    Closed,

    #[error("backend rejected us: {0}")]
    Rejected(String),

    #[error("unsupported backend auth method {0}")]
    UnsupportedAuth(i32),

    #[error("backend requested a password but none is configured")]
    MissingPassword,

    #[error("backend protocol: {0}")]
    Protocol(String),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_password_matches_postgres() {
        assert_eq!(
            md5_password("app", "secret", [1, 2, 3, 4]),
            "md5911f527656472583a006e7727877b33e"
        );
    }

    #[test]
    fn startup_message_layout() {
        let msg = build_startup_message("app", "dev");
        let len = u32::from_be_bytes([msg[0], msg[1], msg[2], msg[3]]) as usize;
        assert_eq!(len, msg.len());
        assert_eq!(&msg[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&msg[8..], b"user\0app\0database\0dev\0\0");
    }

    #[test]
    fn extracts_error_message_field() {
        let mut frame = BytesMut::new();
        frame.put_u8(b'E');
        frame.put_u32(0);
        frame.extend_from_slice(b"SFATAL\0C28P01\0Mpassword authentication failed\0\0");
        let len = (frame.len() - 1) as u32;
        frame[1..5].copy_from_slice(&len.to_be_bytes());

        assert_eq!(error_message(&frame), "password authentication failed");
        assert_eq!(error_message(&[b'E', 0, 0, 0, 5, 0]), "backend error");
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
