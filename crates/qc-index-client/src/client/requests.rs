//! Correlated request operations.
//!
//! Each method registers `handler` under a fresh correlation id and queues
//! the request. It returns the id, or `None` when the handler has already
//! been invoked with a synchronous failure.

use super::IndexClient;
use crate::domain::{
    ClientError, ClientResult, CorrelationId, Handler, HashDigest, SelectionAlgorithm, ShortHash,
    StealthPrefix, TransactionIndex,
};
use crate::engine::Pending;
use crate::ports::DomainCodec;
use crate::protocol::{payload, Command};
use bytes::Bytes;

impl<C: DomainCodec> IndexClient<C> {
    fn request(
        &self,
        command: Command,
        payload: ClientResult<Bytes>,
        pending: Pending<C>,
    ) -> Option<CorrelationId> {
        match payload {
            Ok(payload) => self.dispatcher.submit(command, payload, pending),
            Err(err) => {
                pending.fail(err);
                None
            }
        }
    }

    fn transaction_payload(&self, tx: &C::Transaction) -> ClientResult<Bytes> {
        Ok(Bytes::from(self.codec.encode_transaction(tx)))
    }

    fn block_payload(&self, block: &C::Block) -> ClientResult<Bytes> {
        Ok(Bytes::from(self.codec.encode_block(block)))
    }

    // Memory pool

    pub fn transaction_pool_broadcast<F>(&self, tx: &C::Transaction, handler: F) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<()>) + Send + 'static,
    {
        self.request(
            Command::TransactionPoolBroadcast,
            self.transaction_payload(tx),
            Pending::Result(Box::new(handler)),
        )
    }

    pub fn transaction_pool_validate2<F>(&self, tx: &C::Transaction, handler: F) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<()>) + Send + 'static,
    {
        self.request(
            Command::TransactionPoolValidate2,
            self.transaction_payload(tx),
            Pending::Result(Box::new(handler)),
        )
    }

    pub fn transaction_pool_fetch_transaction<F>(
        &self,
        tx_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Transaction>) + Send + 'static,
    {
        self.request(
            Command::TransactionPoolFetchTransaction,
            Ok(payload::hash(tx_hash)),
            Pending::Transaction(Box::new(handler)),
        )
    }

    pub fn transaction_pool_fetch_transaction2<F>(
        &self,
        tx_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Transaction>) + Send + 'static,
    {
        self.request(
            Command::TransactionPoolFetchTransaction2,
            Ok(payload::hash(tx_hash)),
            Pending::Transaction(Box::new(handler)),
        )
    }

    // Blockchain

    pub fn blockchain_broadcast<F>(&self, block: &C::Block, handler: F) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<()>) + Send + 'static,
    {
        self.request(
            Command::BlockchainBroadcast,
            self.block_payload(block),
            Pending::Result(Box::new(handler)),
        )
    }

    pub fn blockchain_validate<F>(&self, block: &C::Block, handler: F) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<()>) + Send + 'static,
    {
        self.request(
            Command::BlockchainValidate,
            self.block_payload(block),
            Pending::Result(Box::new(handler)),
        )
    }

    /// Confirmed transactions only.
    pub fn blockchain_fetch_transaction<F>(
        &self,
        tx_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Transaction>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchTransaction,
            Ok(payload::hash(tx_hash)),
            Pending::Transaction(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_transaction2<F>(
        &self,
        tx_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Transaction>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchTransaction2,
            Ok(payload::hash(tx_hash)),
            Pending::Transaction(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_last_height<F>(&self, handler: F) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<u32>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchLastHeight,
            Ok(Bytes::new()),
            Pending::Height(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_block_by_height<F>(&self, height: u32, handler: F) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Block>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchBlock,
            Ok(payload::height(height)),
            Pending::Block(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_block_by_hash<F>(
        &self,
        block_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Block>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchBlock,
            Ok(payload::hash(block_hash)),
            Pending::Block(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_block_header_by_height<F>(
        &self,
        height: u32,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Header>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchBlockHeader,
            Ok(payload::height(height)),
            Pending::Header(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_block_header_by_hash<F>(
        &self,
        block_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Header>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchBlockHeader,
            Ok(payload::hash(block_hash)),
            Pending::Header(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_transaction_index<F>(
        &self,
        tx_hash: &HashDigest,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<TransactionIndex>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchTransactionIndex,
            Ok(payload::hash(tx_hash)),
            Pending::TransactionIndex(Box::new(handler)),
        )
    }

    /// Stealth rows matching `prefix` from `from_height` on.
    ///
    /// An invalid prefix fails the handler before anything is sent.
    pub fn blockchain_fetch_stealth2<F>(
        &self,
        prefix: &StealthPrefix,
        from_height: u32,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::Stealth>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchStealth2,
            payload::stealth(prefix, from_height),
            Pending::Stealth(Box::new(handler)),
        )
    }

    pub fn blockchain_fetch_history4<F>(
        &self,
        address: &ShortHash,
        from_height: u32,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::History>) + Send + 'static,
    {
        self.request(
            Command::BlockchainFetchHistory4,
            Ok(payload::history(address, from_height)),
            Pending::History(Box::new(handler)),
        )
    }

    /// Fetch the full history of `address` and select unspent outputs
    /// covering `satoshi` with `algorithm`.
    pub fn blockchain_fetch_unspent_outputs<F>(
        &self,
        address: &ShortHash,
        satoshi: u64,
        algorithm: SelectionAlgorithm,
        handler: F,
    ) -> Option<CorrelationId>
    where
        F: FnOnce(ClientResult<C::PointsValue>) + Send + 'static,
    {
        let codec = self.codec.clone();
        let on_history: Handler<C::History> = Box::new(move |result| {
            handler(result.and_then(|history| {
                codec
                    .select_outputs(history, satoshi, algorithm)
                    .map_err(ClientError::from)
            }))
        });
        self.request(
            Command::BlockchainFetchHistory4,
            Ok(payload::history(address, 0)),
            Pending::History(on_history),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{reply_to, MemoryService, MemoryTransport};
    use crate::adapters::raw::RawCodec;
    use crate::domain::{codes, reply_channel, ClientConfig, ConnectionSettings, TransportError};
    use std::sync::Arc;
    use std::time::Duration;

    async fn connected() -> (IndexClient<RawCodec>, MemoryService) {
        let transport = MemoryTransport::new();
        let settings = ConnectionSettings::new("inproc://query".parse().unwrap());
        let service = transport.bind_service(&settings.server);
        let client = IndexClient::new(
            ClientConfig::for_testing(settings.clone()),
            Arc::new(transport),
            Arc::new(RawCodec),
        );
        client.connect(&settings).await.unwrap();
        (client, service)
    }

    #[tokio::test]
    async fn test_request_payloads_on_wire() {
        let (client, service) = connected().await;
        client.blockchain_fetch_block_by_height(100, |_| {});
        client.blockchain_fetch_block_header_by_hash(&[0xAB; 32], |_| {});
        client.blockchain_fetch_history4(&[0x11; 20], 7, |_| {});
        client.transaction_pool_broadcast(&Bytes::from_static(&[1, 2, 3]), |_| {});
        client.wait(Duration::from_millis(20)).await;

        let requests = service.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].command, "blockchain.fetch_block");
        assert_eq!(requests[0].payload.as_ref(), &[100, 0, 0, 0]);
        assert_eq!(requests[1].command, "blockchain.fetch_block_header");
        assert_eq!(requests[1].payload.as_ref(), &[0xAB; 32]);
        assert_eq!(requests[2].command, "blockchain.fetch_history4");
        assert_eq!(&requests[2].payload[20..], &[7, 0, 0, 0]);
        assert_eq!(requests[3].command, "transaction_pool.broadcast");
        assert_eq!(requests[3].payload.as_ref(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_transaction_index_reply() {
        let (client, service) = connected().await;
        service.respond_with(|request| {
            let body = payload::transaction_index_body(TransactionIndex {
                height: 42,
                position: 3,
            });
            vec![reply_to(request, codes::SUCCESS, &body)]
        });

        let (handler, reply) = reply_channel();
        client.blockchain_fetch_transaction_index(&[0x01; 32], handler);
        assert_eq!(client.wait(Duration::from_secs(1)).await, 0);
        assert_eq!(
            reply.await.unwrap(),
            Ok(TransactionIndex {
                height: 42,
                position: 3
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_stealth_prefix_not_sent() {
        let (client, service) = connected().await;
        let (handler, reply) = reply_channel();
        let prefix = StealthPrefix::from_blocks(40, vec![0; 5]);
        assert!(client.blockchain_fetch_stealth2(&prefix, 0, handler).is_none());

        assert!(matches!(
            reply.await.unwrap(),
            Err(ClientError::InvalidRequest(_))
        ));
        assert_eq!(client.pending_count(), 0);
        client.wait(Duration::from_millis(20)).await;
        assert_eq!(service.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unspent_outputs_with_raw_codec_reports_decode() {
        let (client, service) = connected().await;
        service.respond_with(|request| vec![reply_to(request, codes::SUCCESS, &[9; 8])]);

        let (handler, reply) = reply_channel();
        client.blockchain_fetch_unspent_outputs(
            &[0x22; 20],
            1_000,
            SelectionAlgorithm::Greedy,
            handler,
        );
        client.wait(Duration::from_secs(1)).await;

        assert!(matches!(reply.await.unwrap(), Err(ClientError::Decode(_))));
        let request = &service.requests()[0];
        assert_eq!(request.command, "blockchain.fetch_history4");
        assert_eq!(&request.payload[20..], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_send_failure_delivered() {
        let (client, service) = connected().await;
        service.fail_sends(true);

        let (handler, reply) = reply_channel();
        client.blockchain_fetch_last_height(handler);
        assert_eq!(client.wait(Duration::from_secs(1)).await, 0);

        assert!(matches!(
            reply.await.unwrap(),
            Err(ClientError::Transport(TransportError::SendFailed(_)))
        ));
        assert_eq!(client.stats().transport_failures, 1);
    }
}
