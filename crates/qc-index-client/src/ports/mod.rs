//! # Ports
//!
//! Traits for the collaborators the engine depends on: the message
//! transport and the domain codec.

pub mod codec;
pub mod transport;

pub use codec::DomainCodec;
pub use transport::{ChannelOptions, Envelope, PushSocket, QuerySocket, Transport};
