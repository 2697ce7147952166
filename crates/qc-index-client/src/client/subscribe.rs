//! Filter subscriptions and push channels.

use super::IndexClient;
use crate::connection;
use crate::domain::{
    ClientError, ClientResult, CorrelationId, Endpoint, ShortHash, StealthPrefix,
    SubscriptionEvent, SubscriptionFilter,
};
use crate::ports::DomainCodec;
use crate::protocol::{payload, Command};
use tracing::info;

impl<C: DomainCodec> IndexClient<C> {
    /// Subscribe to activity on `address`.
    ///
    /// `handler` first receives [`SubscriptionEvent::Subscribed`], then one
    /// [`SubscriptionEvent::Update`] per matching transaction. It stays
    /// registered until the server answers with an error status, the idle
    /// policy expires it, or the client disconnects.
    pub fn subscribe_address<F>(&self, address: &ShortHash, handler: F) -> Option<CorrelationId>
    where
        F: FnMut(ClientResult<SubscriptionEvent>) + Send + 'static,
    {
        self.dispatcher.subscribe(
            Command::SubscribeAddress,
            payload::address_subscription(address),
            SubscriptionFilter::Address(*address),
            Box::new(handler),
        )
    }

    /// Subscribe to stealth payments matching `prefix`.
    pub fn subscribe_stealth<F>(&self, prefix: &StealthPrefix, mut handler: F) -> Option<CorrelationId>
    where
        F: FnMut(ClientResult<SubscriptionEvent>) + Send + 'static,
    {
        match payload::stealth_subscription(prefix) {
            Ok(body) => self.dispatcher.subscribe(
                Command::SubscribeStealth,
                body,
                SubscriptionFilter::Stealth(prefix.clone()),
                Box::new(handler),
            ),
            Err(err) => {
                handler(Err(err));
                None
            }
        }
    }

    /// Connect the block push socket to `endpoint` and route decoded blocks
    /// to `handler`, replacing any previous handler.
    ///
    /// If the connect fails the previous socket and handler stay in place.
    /// Waits for any running `wait` or `monitor` to finish.
    pub async fn subscribe_block<F>(&self, endpoint: &Endpoint, handler: F) -> ClientResult<()>
    where
        F: FnMut(C::Block) + Send + 'static,
    {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(ClientError::Disconnected)?;
        let socket = connection::connect_push(self.transport.as_ref(), endpoint, session.options()).await?;
        session.block = Some(socket);
        self.blocks.replace(Box::new(handler));
        info!(endpoint = %endpoint, "Subscribed to block updates");
        Ok(())
    }

    /// Transaction counterpart of [`subscribe_block`](Self::subscribe_block).
    pub async fn subscribe_transaction<F>(&self, endpoint: &Endpoint, handler: F) -> ClientResult<()>
    where
        F: FnMut(C::Transaction) + Send + 'static,
    {
        let mut slot = self.session.lock().await;
        let session = slot.as_mut().ok_or(ClientError::Disconnected)?;
        let socket = connection::connect_push(self.transport.as_ref(), endpoint, session.options()).await?;
        session.transaction = Some(socket);
        self.transactions.replace(Box::new(handler));
        info!(endpoint = %endpoint, "Subscribed to transaction updates");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{reply_to, MemoryTransport};
    use crate::adapters::raw::RawCodec;
    use crate::domain::{codes, ClientConfig, ConnectionSettings, SubscriptionPolicy, UpdateEvent};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup(config: impl FnOnce(&mut ClientConfig)) -> (IndexClient<RawCodec>, MemoryTransport) {
        let transport = MemoryTransport::new();
        let settings = ConnectionSettings::new("inproc://query".parse().unwrap());
        let service = transport.bind_service(&settings.server);
        service.respond_with(|request| vec![reply_to(request, codes::SUCCESS, &[])]);
        let mut client_config = ClientConfig::for_testing(settings);
        config(&mut client_config);
        let client = IndexClient::new(client_config, Arc::new(transport.clone()), Arc::new(RawCodec));
        (client, transport)
    }

    #[tokio::test]
    async fn test_address_subscription_acknowledged() {
        let (client, _transport) = setup(|_| {});
        client.connect_default().await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        client
            .subscribe_address(&[0x33; 20], move |event| sink.lock().push(event))
            .unwrap();
        client.monitor(Duration::from_millis(50)).await;

        assert_eq!(events.lock().as_slice(), &[Ok(SubscriptionEvent::Subscribed)]);
        assert_eq!(client.subscription_count(), 1);
        assert_eq!(client.wait(Duration::from_millis(10)).await, 0);
        assert_eq!(client.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_idle_subscription_expires() {
        let (client, _transport) = setup(|config| {
            config.subscription_policy = SubscriptionPolicy::ExpireIdle { idle_ms: 10 };
        });
        client.connect_default().await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        client.subscribe_address(&[0x44; 20], move |event| sink.lock().push(event));
        client.monitor(Duration::from_millis(60)).await;

        let events = events.lock();
        assert_eq!(events.first(), Some(&Ok(SubscriptionEvent::Subscribed)));
        assert_eq!(events.last(), Some(&Err(ClientError::Timeout)));
        assert_eq!(client.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_block_subscription_requires_session() {
        let (client, transport) = setup(|_| {});
        let endpoint: Endpoint = "inproc://blocks".parse().unwrap();
        transport.bind_publisher(&endpoint);
        assert_eq!(
            client.subscribe_block(&endpoint, |_| {}).await,
            Err(ClientError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_failed_push_reconnect_keeps_handler() {
        let (client, transport) = setup(|_| {});
        client.connect_default().await.unwrap();
        let endpoint: Endpoint = "inproc://blocks".parse().unwrap();
        let publisher = transport.bind_publisher(&endpoint);

        let blocks = Arc::new(Mutex::new(Vec::<Bytes>::new()));
        let sink = blocks.clone();
        client
            .subscribe_block(&endpoint, move |block| sink.lock().push(block))
            .await
            .unwrap();

        let missing: Endpoint = "inproc://nowhere".parse().unwrap();
        assert!(matches!(
            client.subscribe_block(&missing, |_| {}).await,
            Err(ClientError::Connection(_))
        ));

        publisher.publish(vec![7u8]);
        client.monitor(Duration::from_millis(30)).await;
        assert_eq!(blocks.lock().as_slice(), &[Bytes::from_static(&[7])]);
    }

    #[tokio::test]
    async fn test_notification_after_ack() {
        let transport = MemoryTransport::new();
        let settings = ConnectionSettings::new("inproc://query".parse().unwrap());
        let service = transport.bind_service(&settings.server);
        service.respond_with(|request| {
            let update = UpdateEvent {
                sequence: 0,
                height: 0,
                tx_hash: [0xEE; 32],
            };
            let notification = crate::ports::Envelope::new(
                Command::NotificationAddress.name(),
                request.id,
                payload::reply(codes::SUCCESS, &payload::update_body(&update)),
            );
            vec![reply_to(request, codes::SUCCESS, &[]), notification]
        });
        let client = IndexClient::new(
            ClientConfig::for_testing(settings.clone()),
            Arc::new(transport),
            Arc::new(RawCodec),
        );
        client.connect(&settings).await.unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        client.subscribe_address(&[0x55; 20], move |event| sink.lock().push(event));
        client.monitor(Duration::from_millis(50)).await;

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            Ok(SubscriptionEvent::Update(UpdateEvent { tx_hash, .. })) if tx_hash == [0xEE; 32]
        ));
        assert_eq!(client.stats().notifications, 2);
    }
}
