//! # Index Client
//!
//! Public facade tying the connection, dispatcher, router and push
//! channels together.
//!
//! Every request method returns immediately. Replies are matched and
//! handlers invoked only while a caller is inside [`IndexClient::wait`] or
//! [`IndexClient::monitor`].

mod drain;
mod requests;
mod subscribe;

use crate::connection::{self, Session};
use crate::domain::{
    ClientConfig, ClientError, ClientResult, ConnectionSettings, CorrelationId, SubscriptionFilter,
};
use crate::engine::{ClientStats, Dispatcher, PushChannel, ReplyRouter, StatsSnapshot};
use crate::ports::{DomainCodec, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Client for a remote blockchain index service.
pub struct IndexClient<C: DomainCodec> {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    codec: Arc<C>,
    dispatcher: Arc<Dispatcher<C>>,
    router: ReplyRouter<C>,
    /// Only one drain loop may own the sockets at a time.
    session: Mutex<Option<Session>>,
    blocks: PushChannel<C::Block>,
    transactions: PushChannel<C::Transaction>,
    secure: AtomicBool,
    stats: Arc<ClientStats>,
}

impl<C: DomainCodec> IndexClient<C> {
    /// Create a disconnected client.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, codec: Arc<C>) -> Self {
        let stats = Arc::new(ClientStats::default());
        let dispatcher = Arc::new(Dispatcher::new(stats.clone()));
        let router = ReplyRouter::new(dispatcher.clone(), codec.clone(), stats.clone());
        Self {
            config,
            transport,
            codec,
            dispatcher,
            router,
            session: Mutex::new(None),
            blocks: PushChannel::new("block"),
            transactions: PushChannel::new("transaction"),
            secure: AtomicBool::new(false),
            stats,
        }
    }

    /// Connect using `settings`.
    ///
    /// Any previous session is torn down first and its outstanding handlers
    /// complete with [`ClientError::Disconnected`]. On failure the client is
    /// left disconnected.
    pub async fn connect(&self, settings: &ConnectionSettings) -> ClientResult<()> {
        let mut slot = self.session.lock().await;
        if slot.take().is_some() {
            let cleared = self.dispatcher.clear_all(ClientError::Disconnected);
            debug!(cleared, "Replaced previous session");
        }
        self.secure.store(false, Ordering::SeqCst);

        let (session, outbound) =
            connection::open(self.transport.as_ref(), settings, self.config.retry_delay()).await?;
        self.secure
            .store(session.options().security.is_secure(), Ordering::SeqCst);
        self.dispatcher.attach(outbound);
        *slot = Some(session);
        Ok(())
    }

    /// Connect using the configured settings.
    pub async fn connect_default(&self) -> ClientResult<()> {
        let settings = self.config.settings.clone();
        self.connect(&settings).await
    }

    /// Tear down the session. Every outstanding handler, subscriptions
    /// included, completes with [`ClientError::Disconnected`].
    pub async fn disconnect(&self) {
        let mut slot = self.session.lock().await;
        let had_session = slot.take().is_some();
        let cleared = self.dispatcher.clear_all(ClientError::Disconnected);
        self.secure.store(false, Ordering::SeqCst);
        if had_session {
            info!(cleared, "Disconnected from index service");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_attached()
    }

    /// Whether the current session uses curve encryption.
    pub fn is_secure(&self) -> bool {
        self.secure.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Single-shot handlers still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }

    /// Live address and stealth subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.dispatcher.subscription_count()
    }

    /// Live address and stealth subscriptions with their filters, by id.
    pub fn subscriptions(&self) -> Vec<(CorrelationId, SubscriptionFilter)> {
        self.dispatcher.subscriptions()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<C: DomainCodec> Drop for IndexClient<C> {
    fn drop(&mut self) {
        let cleared = self.dispatcher.clear_all(ClientError::Disconnected);
        if cleared > 0 {
            debug!(cleared, "Client dropped with outstanding handlers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryTransport;
    use crate::adapters::raw::RawCodec;
    use crate::domain::{reply_channel, SodiumKey};

    fn settings(server: &str) -> ConnectionSettings {
        ConnectionSettings::new(server.parse().unwrap())
    }

    fn client(transport: &MemoryTransport, settings: ConnectionSettings) -> IndexClient<RawCodec> {
        IndexClient::new(
            ClientConfig::for_testing(settings),
            Arc::new(transport.clone()),
            Arc::new(RawCodec),
        )
    }

    #[tokio::test]
    async fn test_connect_default_and_disconnect() {
        let transport = MemoryTransport::new();
        let settings = settings("inproc://query");
        transport.bind_service(&settings.server);
        let client = client(&transport, settings);

        assert!(!client.is_connected());
        client.connect_default().await.unwrap();
        assert!(client.is_connected());
        assert!(!client.is_secure());

        client.disconnect().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_secure_flag_follows_keys() {
        let transport = MemoryTransport::new();
        let mut settings = settings("inproc://secure");
        settings.server_public_key = Some(SodiumKey::from_bytes([1; 32]));
        settings.client_private_key = Some(SodiumKey::from_bytes([2; 32]));
        transport.bind_service(&settings.server).require_curve(true);
        let client = client(&transport, settings.clone());

        client.connect(&settings).await.unwrap();
        assert!(client.is_secure());
        assert!(transport.last_options().unwrap().security.is_secure());
    }

    #[tokio::test]
    async fn test_disconnect_completes_outstanding() {
        let transport = MemoryTransport::new();
        let settings = settings("inproc://query");
        transport.bind_service(&settings.server);
        let client = client(&transport, settings.clone());
        client.connect(&settings).await.unwrap();

        let (handler, reply) = reply_channel();
        client.blockchain_fetch_last_height(handler);
        client.disconnect().await;

        assert_eq!(reply.await.unwrap(), Err(ClientError::Disconnected));
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_clears_old_session() {
        let transport = MemoryTransport::new();
        let settings = settings("inproc://query");
        transport.bind_service(&settings.server);
        let client = client(&transport, settings.clone());
        client.connect(&settings).await.unwrap();

        let (handler, reply) = reply_channel();
        client.blockchain_fetch_last_height(handler);
        client.connect(&settings).await.unwrap();

        assert_eq!(reply.await.unwrap(), Err(ClientError::Disconnected));
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_drop_completes_outstanding() {
        let transport = MemoryTransport::new();
        let settings = settings("inproc://query");
        transport.bind_service(&settings.server);
        let client = client(&transport, settings.clone());
        client.connect(&settings).await.unwrap();

        let (handler, reply) = reply_channel();
        client.blockchain_fetch_last_height(handler);
        drop(client);

        assert_eq!(reply.await.unwrap(), Err(ClientError::Disconnected));
    }
}
