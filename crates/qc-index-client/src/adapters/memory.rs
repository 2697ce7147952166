//! In-process transport over tokio channels.
//!
//! A [`MemoryTransport`] is a tiny network: services and publishers are
//! bound to endpoints, and clients connect to them by endpoint. Services
//! answer requests through an optional responder and can inject arbitrary
//! frames, which makes out-of-order, duplicate and late replies easy to
//! script.

use crate::domain::{Endpoint, TransportError};
use crate::ports::{ChannelOptions, Envelope, PushSocket, QuerySocket, Transport};
use crate::protocol::payload;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Produces zero or more reply frames for a request.
pub type Responder = Arc<dyn Fn(&Envelope) -> Vec<Envelope> + Send + Sync>;

type QueryFrame = Result<Envelope, TransportError>;
type PushFrame = Result<Bytes, TransportError>;

/// Build a reply frame echoing the request's command and id.
pub fn reply_to(request: &Envelope, status: u32, body: &[u8]) -> Envelope {
    Envelope::new(request.command.clone(), request.id, payload::reply(status, body))
}

#[derive(Default)]
struct NetworkState {
    services: HashMap<Endpoint, Arc<ServiceState>>,
    publishers: HashMap<Endpoint, Arc<PublisherState>>,
    attempts: HashMap<Endpoint, u32>,
    last_options: Option<ChannelOptions>,
}

/// In-memory socket factory.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    network: Arc<Mutex<NetworkState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a query service at `endpoint`, replacing any previous one.
    pub fn bind_service(&self, endpoint: &Endpoint) -> MemoryService {
        let state = Arc::new(ServiceState::default());
        self.network
            .lock()
            .services
            .insert(endpoint.clone(), state.clone());
        MemoryService { state }
    }

    /// Bind a push publisher at `endpoint`, replacing any previous one.
    pub fn bind_publisher(&self, endpoint: &Endpoint) -> MemoryPublisher {
        let state = Arc::new(PublisherState::default());
        self.network
            .lock()
            .publishers
            .insert(endpoint.clone(), state.clone());
        MemoryPublisher { state }
    }

    /// Remove whatever is bound at `endpoint`.
    pub fn unbind(&self, endpoint: &Endpoint) {
        let mut network = self.network.lock();
        network.services.remove(endpoint);
        network.publishers.remove(endpoint);
    }

    /// Connect attempts made against `endpoint`, successful or not.
    pub fn attempts(&self, endpoint: &Endpoint) -> u32 {
        self.network
            .lock()
            .attempts
            .get(endpoint)
            .copied()
            .unwrap_or(0)
    }

    /// Options passed to the most recent connect call.
    pub fn last_options(&self) -> Option<ChannelOptions> {
        self.network.lock().last_options.clone()
    }

    fn record_attempt(&self, endpoint: &Endpoint, options: &ChannelOptions) {
        let mut network = self.network.lock();
        *network.attempts.entry(endpoint.clone()).or_insert(0) += 1;
        network.last_options = Some(options.clone());
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect_query(
        &self,
        endpoint: &Endpoint,
        options: &ChannelOptions,
    ) -> Result<Box<dyn QuerySocket>, TransportError> {
        self.record_attempt(endpoint, options);
        let service = self
            .network
            .lock()
            .services
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(endpoint.to_string()))?;

        if service.reject_handshakes.load(Ordering::SeqCst) {
            return Err(TransportError::HandshakeRejected(endpoint.to_string()));
        }
        if service.require_curve.load(Ordering::SeqCst) && !options.security.is_secure() {
            return Err(TransportError::HandshakeRejected(format!(
                "{endpoint} requires curve"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        service.connections.lock().push(tx.clone());
        Ok(Box::new(MemoryQuerySocket {
            service,
            loopback: tx,
            inbound: rx,
        }))
    }

    async fn connect_push(
        &self,
        endpoint: &Endpoint,
        options: &ChannelOptions,
    ) -> Result<Box<dyn PushSocket>, TransportError> {
        self.record_attempt(endpoint, options);
        let publisher = self
            .network
            .lock()
            .publishers
            .get(endpoint)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(endpoint.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        publisher.subscribers.lock().push(tx);
        Ok(Box::new(MemoryPushSocket { inbound: rx }))
    }
}

#[derive(Default)]
struct ServiceState {
    responder: Mutex<Option<Responder>>,
    received: Mutex<Vec<Envelope>>,
    connections: Mutex<Vec<mpsc::UnboundedSender<QueryFrame>>>,
    reject_handshakes: AtomicBool,
    require_curve: AtomicBool,
    fail_sends: AtomicBool,
}

impl ServiceState {
    fn broadcast(&self, frame: QueryFrame) -> usize {
        let mut connections = self.connections.lock();
        connections.retain(|tx| tx.send(frame.clone()).is_ok());
        connections.len()
    }
}

/// Service side of a bound query endpoint.
#[derive(Clone)]
pub struct MemoryService {
    state: Arc<ServiceState>,
}

impl MemoryService {
    /// Answer every request with the frames `responder` returns.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Envelope) -> Vec<Envelope> + Send + Sync + 'static,
    {
        *self.state.responder.lock() = Some(Arc::new(responder));
    }

    /// Stop answering; requests are only recorded.
    pub fn silence(&self) {
        *self.state.responder.lock() = None;
    }

    /// Deliver `frame` to every connected client.
    pub fn inject(&self, frame: Envelope) -> usize {
        self.state.broadcast(Ok(frame))
    }

    /// Fail the receive side of every connected client.
    pub fn break_connections(&self, error: TransportError) {
        self.state.broadcast(Err(error));
    }

    pub fn reject_handshakes(&self, reject: bool) {
        self.state.reject_handshakes.store(reject, Ordering::SeqCst);
    }

    pub fn require_curve(&self, require: bool) {
        self.state.require_curve.store(require, Ordering::SeqCst);
    }

    /// Make client sends fail.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<Envelope> {
        self.state.received.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.received.lock().len()
    }
}

struct MemoryQuerySocket {
    service: Arc<ServiceState>,
    loopback: mpsc::UnboundedSender<QueryFrame>,
    inbound: mpsc::UnboundedReceiver<QueryFrame>,
}

#[async_trait]
impl QuerySocket for MemoryQuerySocket {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        if self.service.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed(envelope.command));
        }
        let responder = self.service.responder.lock().clone();
        self.service.received.lock().push(envelope.clone());
        if let Some(responder) = responder {
            for reply in responder(&envelope) {
                self.loopback
                    .send(Ok(reply))
                    .map_err(|_| TransportError::ChannelClosed)?;
            }
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<Envelope, TransportError> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            None => Err(TransportError::ChannelClosed),
        }
    }
}

#[derive(Default)]
struct PublisherState {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PushFrame>>>,
}

/// Publisher side of a bound push endpoint.
#[derive(Clone)]
pub struct MemoryPublisher {
    state: Arc<PublisherState>,
}

impl MemoryPublisher {
    /// Send `frame` to every live subscriber. Returns how many got it.
    pub fn publish(&self, frame: impl Into<Bytes>) -> usize {
        let frame: Bytes = frame.into();
        let mut subscribers = self.state.subscribers.lock();
        subscribers.retain(|tx| tx.send(Ok(frame.clone())).is_ok());
        subscribers.len()
    }

    /// Fail every subscriber's receive side.
    pub fn break_subscribers(&self, error: TransportError) {
        let mut subscribers = self.state.subscribers.lock();
        for tx in subscribers.drain(..) {
            let _ = tx.send(Err(error.clone()));
        }
    }
}

struct MemoryPushSocket {
    inbound: mpsc::UnboundedReceiver<PushFrame>,
}

#[async_trait]
impl PushSocket for MemoryPushSocket {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            None => Err(TransportError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorrelationId;

    fn endpoint(s: &str) -> Endpoint {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_unbound_endpoint_unreachable() {
        let transport = MemoryTransport::new();
        let target = endpoint("tcp://127.0.0.1:1");
        let result = transport
            .connect_query(&target, &ChannelOptions::default())
            .await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
        assert_eq!(transport.attempts(&target), 1);
    }

    #[tokio::test]
    async fn test_responder_replies_on_send() {
        let transport = MemoryTransport::new();
        let target = endpoint("inproc://query");
        let service = transport.bind_service(&target);
        service.respond_with(|request| vec![reply_to(request, 0, &[1, 0, 0, 0])]);

        let mut socket = transport
            .connect_query(&target, &ChannelOptions::default())
            .await
            .unwrap();
        socket
            .send(Envelope::new(
                "blockchain.fetch_last_height",
                CorrelationId::new(5),
                Bytes::new(),
            ))
            .await
            .unwrap();

        let reply = socket.recv().await.unwrap();
        assert_eq!(reply.id, CorrelationId::new(5));
        assert_eq!(reply.payload.as_ref(), &[0, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(service.request_count(), 1);
    }

    #[tokio::test]
    async fn test_curve_required() {
        let transport = MemoryTransport::new();
        let target = endpoint("inproc://secure");
        transport.bind_service(&target).require_curve(true);
        let result = transport
            .connect_query(&target, &ChannelOptions::default())
            .await;
        assert!(matches!(result, Err(TransportError::HandshakeRejected(_))));
    }

    #[tokio::test]
    async fn test_publisher_fan_out() {
        let transport = MemoryTransport::new();
        let target = endpoint("inproc://blocks");
        let publisher = transport.bind_publisher(&target);
        let mut first = transport
            .connect_push(&target, &ChannelOptions::default())
            .await
            .unwrap();
        let mut second = transport
            .connect_push(&target, &ChannelOptions::default())
            .await
            .unwrap();

        assert_eq!(publisher.publish(vec![1u8, 2]), 2);
        assert_eq!(first.recv().await.unwrap().as_ref(), &[1, 2]);
        assert_eq!(second.recv().await.unwrap().as_ref(), &[1, 2]);
    }
}
