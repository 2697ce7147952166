//! Request dispatcher.
//!
//! Allocates the correlation id, registers the handler and queues the frame
//! on the loopback in one critical section, so a reply can never observe
//! an id whose handler is not yet in place.

use crate::domain::{
    ClientError, CorrelationCounter, CorrelationId, SubscriptionFilter, TransportError,
    UpdateHandler,
};
use crate::engine::registry::{notify, HandlerRegistry, Pending, SharedUpdateHandler};
use crate::engine::stats::ClientStats;
use crate::ports::{DomainCodec, Envelope};
use crate::protocol::{Command, ResultShape};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound side of the loopback pair.
pub type Outbound = mpsc::UnboundedSender<Envelope>;

struct DispatchState<C: DomainCodec> {
    counter: CorrelationCounter,
    registry: HandlerRegistry<C>,
    outbound: Option<Outbound>,
}

pub struct Dispatcher<C: DomainCodec> {
    state: Mutex<DispatchState<C>>,
    stats: Arc<ClientStats>,
}

impl<C: DomainCodec> Dispatcher<C> {
    pub fn new(stats: Arc<ClientStats>) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                counter: CorrelationCounter::default(),
                registry: HandlerRegistry::new(),
                outbound: None,
            }),
            stats,
        }
    }

    /// Route future submissions into `outbound`.
    pub fn attach(&self, outbound: Outbound) {
        self.state.lock().outbound = Some(outbound);
    }

    /// Stop accepting submissions.
    pub fn detach(&self) {
        self.state.lock().outbound = None;
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().outbound.is_some()
    }

    /// Register a single-shot handler and queue its request.
    ///
    /// On failure the handler has already been invoked with the error.
    pub fn submit(
        &self,
        command: Command,
        payload: Bytes,
        pending: Pending<C>,
    ) -> Option<CorrelationId> {
        debug_assert_eq!(command.shape(), pending.shape());
        let mut state = self.state.lock();
        let Some(outbound) = state.outbound.clone() else {
            drop(state);
            self.fail_unsent(command, pending);
            return None;
        };

        let DispatchState {
            counter, registry, ..
        } = &mut *state;
        let id = counter.next(|candidate| registry.contains(candidate));
        registry.insert(id, pending);

        if outbound.send(Envelope::new(command.name(), id, payload)).is_err() {
            let pending = state.registry.take(command.shape(), id);
            state.outbound = None;
            drop(state);
            if let Some(pending) = pending {
                self.fail_unsent(command, pending);
            }
            return None;
        }
        drop(state);

        ClientStats::bump(&self.stats.registered);
        debug!(correlation_id = %id, command = %command, "Registered request");
        Some(id)
    }

    /// Register a persistent subscription handler and queue its request.
    pub fn subscribe(
        &self,
        command: Command,
        payload: Bytes,
        filter: SubscriptionFilter,
        mut handler: UpdateHandler,
    ) -> Option<CorrelationId> {
        let mut state = self.state.lock();
        let Some(outbound) = state.outbound.clone() else {
            drop(state);
            ClientStats::bump(&self.stats.transport_failures);
            warn!(command = %command, "Subscribe attempted without a connection");
            handler(Err(TransportError::ChannelClosed.into()));
            return None;
        };

        let DispatchState {
            counter, registry, ..
        } = &mut *state;
        let id = counter.next(|candidate| registry.contains(candidate));
        registry.insert_subscription(id, filter, handler);

        if outbound.send(Envelope::new(command.name(), id, payload)).is_err() {
            let handler = state.registry.remove_subscription(id);
            state.outbound = None;
            drop(state);
            ClientStats::bump(&self.stats.transport_failures);
            if let Some(handler) = handler {
                notify(
                    &handler,
                    Err(TransportError::ChannelClosed.into()),
                );
            }
            return None;
        }
        drop(state);

        ClientStats::bump(&self.stats.registered);
        debug!(correlation_id = %id, command = %command, "Registered subscription");
        Some(id)
    }

    fn fail_unsent(&self, command: Command, pending: Pending<C>) {
        ClientStats::bump(&self.stats.transport_failures);
        warn!(command = %command, "Request attempted without a connection");
        pending.fail(TransportError::ChannelClosed.into());
    }

    /// Remove a single-shot handler from the map for `shape`.
    pub fn take(&self, shape: ResultShape, id: CorrelationId) -> Option<Pending<C>> {
        self.state.lock().registry.take(shape, id)
    }

    /// Fail whatever is registered under `id` for `command`.
    ///
    /// Used when a queued frame could not be written to the socket.
    pub fn fail(&self, command: Command, id: CorrelationId, error: ClientError) {
        if command.shape() == ResultShape::Update {
            let handler = self.state.lock().registry.remove_subscription(id);
            if let Some(handler) = handler {
                notify(&handler, Err(error));
            }
        } else {
            let pending = self.take(command.shape(), id);
            if let Some(pending) = pending {
                pending.fail(error);
            }
        }
    }

    pub fn touch_subscription(
        &self,
        id: CorrelationId,
        command: Command,
    ) -> Option<SharedUpdateHandler> {
        self.state.lock().registry.touch_subscription(id, command)
    }

    pub fn take_subscription(
        &self,
        id: CorrelationId,
        command: Command,
    ) -> Option<SharedUpdateHandler> {
        self.state.lock().registry.take_subscription(id, command)
    }

    pub fn subscriptions(&self) -> Vec<(CorrelationId, SubscriptionFilter)> {
        self.state.lock().registry.subscriptions()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().registry.pending_count()
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().registry.subscription_count()
    }

    /// Complete every single-shot handler with `error`.
    ///
    /// Handlers run after the lock is released.
    pub fn clear_pending(&self, error: ClientError) -> usize {
        let drained = self.state.lock().registry.drain_pending();
        let count = drained.len();
        for (id, pending) in drained {
            debug!(correlation_id = %id, error = %error, "Force-completing request");
            pending.fail(error.clone());
        }
        count
    }

    /// Complete every handler, subscriptions included, with `error` and stop
    /// accepting submissions.
    pub fn clear_all(&self, error: ClientError) -> usize {
        let (pending, subscriptions) = {
            let mut state = self.state.lock();
            state.outbound = None;
            (
                state.registry.drain_pending(),
                state.registry.drain_subscriptions(),
            )
        };
        let count = pending.len() + subscriptions.len();
        for (_, pending) in pending {
            pending.fail(error.clone());
        }
        for (_, handler) in subscriptions {
            notify(&handler, Err(error.clone()));
        }
        count
    }

    /// Expire subscriptions idle for longer than `limit`.
    pub fn expire_idle(&self, limit: Duration) -> usize {
        let expired = self
            .state
            .lock()
            .registry
            .expire_idle(Instant::now(), limit);
        let count = expired.len();
        for (id, handler) in expired {
            warn!(correlation_id = %id, "Subscription expired after inactivity");
            notify(&handler, Err(ClientError::Timeout));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::raw::RawCodec;
    use std::collections::HashSet;

    fn dispatcher() -> (Dispatcher<RawCodec>, mpsc::UnboundedReceiver<Envelope>) {
        let dispatcher = Dispatcher::new(Arc::new(ClientStats::default()));
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher.attach(tx);
        (dispatcher, rx)
    }

    fn result_sink() -> (Pending<RawCodec>, Arc<Mutex<Vec<Result<u32, ClientError>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (
            Pending::Height(Box::new(move |r| sink.lock().push(r))),
            seen,
        )
    }

    #[test]
    fn test_submit_queues_frame() {
        let (dispatcher, mut rx) = dispatcher();
        let (pending, _) = result_sink();
        let id = dispatcher
            .submit(Command::BlockchainFetchLastHeight, Bytes::new(), pending)
            .unwrap();

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.command, "blockchain.fetch_last_height");
        assert_eq!(dispatcher.pending_count(), 1);
    }

    #[test]
    fn test_ids_unique_across_shapes() {
        let (dispatcher, _rx) = dispatcher();
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let (pending, _) = result_sink();
            ids.insert(
                dispatcher
                    .submit(Command::BlockchainFetchLastHeight, Bytes::new(), pending)
                    .unwrap(),
            );
            ids.insert(
                dispatcher
                    .submit(
                        Command::BlockchainBroadcast,
                        Bytes::new(),
                        Pending::Result(Box::new(|_| {})),
                    )
                    .unwrap(),
            );
        }
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_submit_without_connection_fails_synchronously() {
        let dispatcher: Dispatcher<RawCodec> = Dispatcher::new(Arc::new(ClientStats::default()));
        let (pending, seen) = result_sink();
        assert!(dispatcher
            .submit(Command::BlockchainFetchLastHeight, Bytes::new(), pending)
            .is_none());

        assert_eq!(
            seen.lock().as_slice(),
            &[Err(ClientError::Transport(TransportError::ChannelClosed))]
        );
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_closed_loopback_removes_entry() {
        let (dispatcher, rx) = dispatcher();
        drop(rx);
        let (pending, seen) = result_sink();
        assert!(dispatcher
            .submit(Command::BlockchainFetchLastHeight, Bytes::new(), pending)
            .is_none());
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(dispatcher.pending_count(), 0);
        assert!(!dispatcher.is_attached());
    }

    #[test]
    fn test_clear_pending_spares_subscriptions() {
        let (dispatcher, _rx) = dispatcher();
        let (pending, seen) = result_sink();
        dispatcher.submit(Command::BlockchainFetchLastHeight, Bytes::new(), pending);
        dispatcher.subscribe(
            Command::SubscribeAddress,
            Bytes::new(),
            SubscriptionFilter::Address([0u8; 20]),
            Box::new(|_| {}),
        );

        assert_eq!(dispatcher.clear_pending(ClientError::Timeout), 1);
        assert_eq!(seen.lock().as_slice(), &[Err(ClientError::Timeout)]);
        assert_eq!(dispatcher.subscription_count(), 1);

        assert_eq!(dispatcher.clear_all(ClientError::Disconnected), 1);
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[test]
    fn test_handler_may_resubmit_from_failure() {
        let dispatcher = Arc::new(Dispatcher::<RawCodec>::new(Arc::new(
            ClientStats::default(),
        )));
        let (tx, _rx) = mpsc::unbounded_channel();
        dispatcher.attach(tx);

        let inner = dispatcher.clone();
        dispatcher.submit(
            Command::BlockchainFetchLastHeight,
            Bytes::new(),
            Pending::Height(Box::new(move |_| {
                inner.submit(
                    Command::BlockchainFetchLastHeight,
                    Bytes::new(),
                    Pending::Height(Box::new(|_| {})),
                );
            })),
        );
        assert_eq!(dispatcher.clear_pending(ClientError::Timeout), 1);
        assert_eq!(dispatcher.pending_count(), 1);
    }
}
