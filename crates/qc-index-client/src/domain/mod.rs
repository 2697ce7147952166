//! Domain types for the Index Client.
//!
//! Correlation ids, handler shapes, configuration and error handling.

pub mod config;
pub mod correlation;
pub mod error;
pub mod handlers;
pub mod types;

pub use config::{
    Authority, ChannelSecurity, ClientConfig, ConnectionSettings, Endpoint, SodiumKey,
    SubscriptionPolicy, DEFAULT_TIMEOUT_MS,
};
pub use correlation::{CorrelationCounter, CorrelationId};
pub use error::{codes, ClientError, ClientResult, CodecError, ConfigError, TransportError};
pub use handlers::{reply_channel, Handler, HandlerMap, PushHandler, UpdateHandler};
pub use types::*;
