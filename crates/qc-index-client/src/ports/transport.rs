//! Transport port: framed sockets provided by the message layer.
//!
//! The engine never touches wire encryption, proxying or framing. It opens
//! sockets through [`Transport`] and moves whole frames through them.

use crate::domain::{Authority, ChannelSecurity, CorrelationId, Endpoint, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Addressed frame exchanged on the query socket.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Command token, e.g. `blockchain.fetch_last_height`
    pub command: String,
    /// Correlation id of the originating call
    pub id: CorrelationId,
    /// Request arguments or `status ‖ body` for replies
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(command: impl Into<String>, id: CorrelationId, payload: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            id,
            payload: payload.into(),
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("command", &self.command)
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Per-session socket options selected at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Plain or curve-encrypted framing
    pub security: ChannelSecurity,
    /// SOCKS proxy every socket is routed through
    pub socks: Option<Authority>,
}

/// Request/reply socket to the query service.
///
/// `recv` must be cancel-safe: the drain loop races it against the
/// deadline and the loopback queue.
#[async_trait]
pub trait QuerySocket: Send {
    /// Queue a frame for delivery.
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError>;

    /// Wait for the next reply frame.
    async fn recv(&mut self) -> Result<Envelope, TransportError>;
}

/// Subscriber socket for unprompted block or transaction frames.
///
/// `recv` must be cancel-safe.
#[async_trait]
pub trait PushSocket: Send {
    /// Wait for the next raw frame.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;
}

/// Socket factory.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one handshake attempt against a query endpoint.
    async fn connect_query(
        &self,
        endpoint: &Endpoint,
        options: &ChannelOptions,
    ) -> Result<Box<dyn QuerySocket>, TransportError>;

    /// Open a subscriber socket on a push endpoint.
    async fn connect_push(
        &self,
        endpoint: &Endpoint,
        options: &ChannelOptions,
    ) -> Result<Box<dyn PushSocket>, TransportError>;
}
