//! QC Index Client - correlated queries and push subscriptions against a
//! remote blockchain index service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        IndexClient                           │
//! │                                                              │
//! │  request(..) ──► Dispatcher ──► loopback ─┐                  │
//! │                 (id + handler             │                  │
//! │                  under one lock)          ▼                  │
//! │                                   wait / monitor ──► Query   │
//! │  handler ◄── ReplyRouter ◄──────────────┘   socket   ▲       │
//! │                                                      │       │
//! │  block / tx handler ◄── PushChannel ◄── push sockets │       │
//! └──────────────────────────────────────────────────────┼───────┘
//!                                                        ▼
//!                                                 index service
//! ```
//!
//! Calls return immediately. Replies are matched to handlers by command and
//! correlation id while a caller drives [`IndexClient::wait`] or
//! [`IndexClient::monitor`]. Every single-shot handler runs exactly once:
//! with the decoded reply, a remote error, a transport failure, or a timeout
//! when `wait` gives up.
//!
//! # Usage
//!
//! ```ignore
//! use qc_index_client::{reply_channel, ClientConfig, IndexClient};
//!
//! let client = IndexClient::new(ClientConfig::from_env()?, transport, codec);
//! client.connect_default().await?;
//!
//! let (handler, height) = reply_channel();
//! client.blockchain_fetch_last_height(handler);
//! client.wait_default().await;
//! println!("tip: {}", height.await??);
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod client;
pub mod connection;
pub mod domain;
pub mod engine;
pub mod logging;
pub mod ports;
pub mod protocol;

pub use client::IndexClient;
pub use domain::{
    codes, reply_channel, ChannelSecurity, ClientConfig, ClientError, ClientResult, CodecError,
    ConfigError, ConnectionSettings, CorrelationId, Endpoint, SelectionAlgorithm,
    StealthPrefix, SubscriptionEvent, SubscriptionFilter, SubscriptionPolicy, TransactionIndex,
    TransportError, UpdateEvent,
};
pub use engine::StatsSnapshot;
pub use logging::{init_logging, LogConfig};
pub use ports::{DomainCodec, Envelope, PushSocket, QuerySocket, Transport};
pub use protocol::Command;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
