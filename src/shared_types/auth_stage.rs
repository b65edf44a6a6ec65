/// Where a frontend connection is in the handshake.
///
/// Only `Ready` hands client bytes to the interception pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Expecting a `StartupMessage`, `SSLRequest`, `GSSENCRequest` or
    /// `CancelRequest`.
    Startup,

    /// `AuthenticationCleartextPassword` sent, expecting a `PasswordMessage`.
    Authenticating,

    /// Authenticated; statements flow through interception to the pools.
    Ready,
}
