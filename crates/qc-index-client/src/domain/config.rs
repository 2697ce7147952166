//! Client configuration with validation.
//!
//! `ConnectionSettings` is consumed once by `connect`; `ClientConfig` adds
//! the loop timeouts and subscription policy around it.

use crate::domain::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default bound for `wait` and `monitor`, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default connect attempts.
pub const DEFAULT_RETRIES: u32 = 5;

/// Socket endpoint such as `tcp://127.0.0.1:9091`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    scheme: String,
    address: String,
}

impl Endpoint {
    /// URL scheme (`tcp`, `ipc`, `inproc`).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Everything after `://`.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidEndpoint(s.to_string());
        let (scheme, address) = s.split_once("://").ok_or_else(invalid)?;
        if address.is_empty() {
            return Err(invalid());
        }
        match scheme {
            "tcp" => {
                Authority::from_str(address).map_err(|_| invalid())?;
            }
            "ipc" | "inproc" => {}
            _ => return Err(invalid()),
        }
        Ok(Self {
            scheme: scheme.to_string(),
            address: address.to_string(),
        })
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address)
    }
}

/// `host:port` pair, used for the SOCKS proxy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority {
    host: String,
    port: u16,
}

impl Authority {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Authority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidAuthority(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl TryFrom<String> for Authority {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Authority> for String {
    fn from(authority: Authority) -> Self {
        authority.to_string()
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// 32-byte curve key, hex encoded in configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SodiumKey([u8; 32]);

impl SodiumKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for SodiumKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ConfigError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(key))
    }
}

impl TryFrom<String> for SodiumKey {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SodiumKey> for String {
    fn from(key: SodiumKey) -> Self {
        hex::encode(key.0)
    }
}

// Keys never reach logs.
impl fmt::Debug for SodiumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SodiumKey(..)")
    }
}

/// Framing selected for every socket of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ChannelSecurity {
    /// Unauthenticated, unencrypted channel
    #[default]
    Plain,
    /// Curve-encrypted channel
    Curve {
        server_public_key: SodiumKey,
        client_private_key: SodiumKey,
    },
}

impl ChannelSecurity {
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Curve { .. })
    }
}

/// Settings consumed by a single `connect` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Attempts made for the primary socket handshake
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Query endpoint
    pub server: Endpoint,
    /// Dedicated block update endpoint
    #[serde(default)]
    pub block_server: Option<Endpoint>,
    /// Dedicated transaction update endpoint
    #[serde(default)]
    pub transaction_server: Option<Endpoint>,
    /// SOCKS proxy authority
    #[serde(default)]
    pub socks: Option<Authority>,
    #[serde(default)]
    pub server_public_key: Option<SodiumKey>,
    #[serde(default)]
    pub client_private_key: Option<SodiumKey>,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

impl ConnectionSettings {
    /// Plain settings for a single query endpoint.
    pub fn new(server: Endpoint) -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            server,
            block_server: None,
            transaction_server: None,
            socks: None,
            server_public_key: None,
            client_private_key: None,
        }
    }

    /// Select the channel security. Keys must be supplied as a pair.
    pub fn security(&self) -> Result<ChannelSecurity, ConfigError> {
        match (&self.server_public_key, &self.client_private_key) {
            (None, None) => Ok(ChannelSecurity::Plain),
            (Some(server), Some(client)) => Ok(ChannelSecurity::Curve {
                server_public_key: server.clone(),
                client_private_key: client.clone(),
            }),
            _ => Err(ConfigError::IncompleteKeyPair),
        }
    }

    /// Validate settings before any socket is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.security().map(|_| ())
    }

    /// Handshake attempts for the primary socket. Zero retries still
    /// makes one attempt.
    pub fn attempts(&self) -> u32 {
        self.retries.max(1)
    }
}

/// What happens to filter subscriptions that go quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionPolicy {
    /// Keep every subscription until disconnect
    #[default]
    Persistent,
    /// Complete with a timeout after `idle_ms` without activity
    ExpireIdle { idle_ms: u64 },
}

impl SubscriptionPolicy {
    pub fn idle_limit(&self) -> Option<Duration> {
        match self {
            Self::Persistent => None,
            Self::ExpireIdle { idle_ms } => Some(Duration::from_millis(*idle_ms)),
        }
    }
}

/// Full client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Connection settings for `connect_default`
    pub settings: ConnectionSettings,
    /// Pause between handshake attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Default bound for `wait`
    #[serde(default = "default_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// Default bound for `monitor`
    #[serde(default = "default_timeout_ms")]
    pub monitor_timeout_ms: u64,
    /// Idle policy for filter subscriptions
    #[serde(default)]
    pub subscription_policy: SubscriptionPolicy,
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            settings: ConnectionSettings::new(Endpoint {
                scheme: "tcp".to_string(),
                address: "127.0.0.1:9091".to_string(),
            }),
            retry_delay_ms: default_retry_delay_ms(),
            wait_timeout_ms: DEFAULT_TIMEOUT_MS,
            monitor_timeout_ms: DEFAULT_TIMEOUT_MS,
            subscription_policy: SubscriptionPolicy::Persistent,
        }
    }
}

impl ClientConfig {
    /// Config with the given settings and default timeouts.
    pub fn with_settings(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Create a config for testing (no retry pause, short bounds).
    pub fn for_testing(settings: ConnectionSettings) -> Self {
        Self {
            settings,
            retry_delay_ms: 0,
            wait_timeout_ms: 1_000,
            monitor_timeout_ms: 1_000,
            subscription_policy: SubscriptionPolicy::Persistent,
        }
    }

    /// Read configuration from the environment.
    ///
    /// - `QC_INDEX_SERVER`: query endpoint (default: tcp://127.0.0.1:9091)
    /// - `QC_INDEX_BLOCK_SERVER`, `QC_INDEX_TRANSACTION_SERVER`: push endpoints
    /// - `QC_INDEX_SOCKS`: proxy authority
    /// - `QC_INDEX_SERVER_KEY`, `QC_INDEX_CLIENT_KEY`: hex curve keys
    /// - `QC_INDEX_RETRIES`: handshake attempts (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(server) = env::var("QC_INDEX_SERVER") {
            config.settings.server = server.parse()?;
        }
        config.settings.block_server = optional_env("QC_INDEX_BLOCK_SERVER")?;
        config.settings.transaction_server = optional_env("QC_INDEX_TRANSACTION_SERVER")?;
        config.settings.socks = optional_env("QC_INDEX_SOCKS")?;
        config.settings.server_public_key = optional_env("QC_INDEX_SERVER_KEY")?;
        config.settings.client_private_key = optional_env("QC_INDEX_CLIENT_KEY")?;
        config.settings.retries = env::var("QC_INDEX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RETRIES);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if self.wait_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("wait timeout cannot be 0".into()));
        }
        if self.monitor_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("monitor timeout cannot be 0".into()));
        }
        if self.subscription_policy == (SubscriptionPolicy::ExpireIdle { idle_ms: 0 }) {
            return Err(ConfigError::InvalidTimeout("subscription idle limit cannot be 0".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_timeout_ms)
    }
}

fn optional_env<T: FromStr<Err = ConfigError>>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}
