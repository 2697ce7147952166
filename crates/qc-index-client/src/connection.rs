//! Connection establishment and the live session.

use crate::domain::{ClientError, ConnectionSettings, Endpoint, TransportError};
use crate::ports::{ChannelOptions, Envelope, PushSocket, QuerySocket, Transport};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sockets and loopback receiver owned by one connected client.
pub struct Session {
    pub(crate) query: Box<dyn QuerySocket>,
    pub(crate) block: Option<Box<dyn PushSocket>>,
    pub(crate) transaction: Option<Box<dyn PushSocket>>,
    pub(crate) loopback: mpsc::UnboundedReceiver<Envelope>,
    pub(crate) options: ChannelOptions,
}

impl Session {
    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn has_block_channel(&self) -> bool {
        self.block.is_some()
    }

    pub fn has_transaction_channel(&self) -> bool {
        self.transaction.is_some()
    }
}

/// Socket options derived from connection settings.
pub fn channel_options(settings: &ConnectionSettings) -> Result<ChannelOptions, ClientError> {
    Ok(ChannelOptions {
        security: settings.security()?,
        socks: settings.socks.clone(),
    })
}

/// Open the query socket, making up to `attempts` handshakes.
pub async fn connect_query(
    transport: &dyn Transport,
    endpoint: &Endpoint,
    options: &ChannelOptions,
    attempts: u32,
    retry_delay: Duration,
) -> Result<Box<dyn QuerySocket>, ClientError> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match transport.connect_query(endpoint, options).await {
            Ok(socket) => {
                debug!(endpoint = %endpoint, attempt, "Query socket connected");
                return Ok(socket);
            }
            Err(err) => {
                warn!(
                    endpoint = %endpoint,
                    attempt,
                    attempts,
                    error = %err,
                    "Connect attempt failed"
                );
                last_error = Some(err);
                if attempt < attempts && !retry_delay.is_zero() {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    Err(connection_error(
        endpoint,
        last_error.unwrap_or_else(|| TransportError::Unreachable(endpoint.to_string())),
    ))
}

/// Open a push socket. One attempt.
pub async fn connect_push(
    transport: &dyn Transport,
    endpoint: &Endpoint,
    options: &ChannelOptions,
) -> Result<Box<dyn PushSocket>, ClientError> {
    let socket = transport
        .connect_push(endpoint, options)
        .await
        .map_err(|err| connection_error(endpoint, err))?;
    debug!(endpoint = %endpoint, "Push socket connected");
    Ok(socket)
}

/// Open every socket the settings name.
pub async fn open(
    transport: &dyn Transport,
    settings: &ConnectionSettings,
    retry_delay: Duration,
) -> Result<(Session, mpsc::UnboundedSender<Envelope>), ClientError> {
    settings.validate()?;
    let options = channel_options(settings)?;

    let query = connect_query(
        transport,
        &settings.server,
        &options,
        settings.attempts(),
        retry_delay,
    )
    .await?;
    let block = match &settings.block_server {
        Some(endpoint) => Some(connect_push(transport, endpoint, &options).await?),
        None => None,
    };
    let transaction = match &settings.transaction_server {
        Some(endpoint) => Some(connect_push(transport, endpoint, &options).await?),
        None => None,
    };

    info!(
        server = %settings.server,
        secure = options.security.is_secure(),
        block_channel = block.is_some(),
        transaction_channel = transaction.is_some(),
        "Connected to index service"
    );

    let (outbound, loopback) = mpsc::unbounded_channel();
    Ok((
        Session {
            query,
            block,
            transaction,
            loopback,
            options,
        },
        outbound,
    ))
}

fn connection_error(endpoint: &Endpoint, err: TransportError) -> ClientError {
    ClientError::Connection(format!("{endpoint}: {err}"))
}
