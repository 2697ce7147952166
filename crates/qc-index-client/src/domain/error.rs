//! Index client error types.
//!
//! Remote and timeout failures are delivered through handlers; only
//! connection-level failures are returned directly from `connect`.

use thiserror::Error;

/// Status codes carried in the first four bytes of every reply payload.
pub mod codes {
    /// The server processed the request.
    pub const SUCCESS: u32 = 0;
    /// The requested object does not exist on the server.
    pub const NOT_FOUND: u32 = 3;
    /// The server could not parse the request payload.
    pub const BAD_STREAM: u32 = 6;
    /// The server rejected the request for an internal reason.
    pub const OPERATION_FAILED: u32 = 8;
}

/// Error delivered to a request or subscription handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Connect handshake exhausted its retries or was rejected.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The transport refused or lost a frame.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The server replied with a non-zero status.
    #[error("remote error (code {code})")]
    Remote {
        /// Status code from the reply
        code: u32,
    },

    /// No reply arrived before the wait deadline.
    #[error("request timed out")]
    Timeout,

    /// The reply body did not decode into the expected shape.
    #[error("decode failed: {0}")]
    Decode(#[from] CodecError),

    /// The call violated a structural precondition and was never sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client was disconnected or dropped with the call outstanding.
    #[error("client disconnected")]
    Disconnected,

    /// Connection settings were rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Map a reply status code to a result.
    pub fn from_status(code: u32) -> Result<(), Self> {
        if code == codes::SUCCESS {
            Ok(())
        } else {
            Err(Self::Remote { code })
        }
    }
}

/// Failure at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Failure decoding a reply body or push frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("unsupported by codec: {0}")]
    Unsupported(&'static str),
}

/// Invalid connection or client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
    #[error("invalid proxy authority {0:?}")]
    InvalidAuthority(String),
    #[error("invalid curve key: {0}")]
    InvalidKey(String),
    #[error("server public key and client private key must be supplied together")]
    IncompleteKeyPair,
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Result type for index client operations
pub type ClientResult<T> = Result<T, ClientError>;
