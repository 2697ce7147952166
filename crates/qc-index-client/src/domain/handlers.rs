//! Handler shapes and the per-shape handler map.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::ClientError;
use crate::domain::types::SubscriptionEvent;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Single-shot handler consuming a result of shape `R`.
pub type Handler<R> = Box<dyn FnOnce(Result<R, ClientError>) + Send + 'static>;

/// Persistent handler for address and stealth subscriptions.
pub type UpdateHandler = Box<dyn FnMut(Result<SubscriptionEvent, ClientError>) + Send + 'static>;

/// Handler installed on a block or transaction push channel.
pub type PushHandler<T> = Box<dyn FnMut(T) + Send + 'static>;

/// Map from correlation id to the single-shot handler waiting on it.
///
/// Removal hands the handler back to the caller, which invokes it after
/// releasing any lock guarding the map.
pub struct HandlerMap<R> {
    entries: HashMap<CorrelationId, Handler<R>>,
}

impl<R> HandlerMap<R> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: CorrelationId, handler: Handler<R>) {
        self.entries.insert(id, handler);
    }

    pub fn remove(&mut self, id: CorrelationId) -> Option<Handler<R>> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, returning the handlers in no particular order.
    pub fn drain(&mut self) -> Vec<(CorrelationId, Handler<R>)> {
        self.entries.drain().collect()
    }
}

impl<R> Default for HandlerMap<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge a callback-shaped call to a awaitable receiver.
///
/// ```ignore
/// let (handler, reply) = reply_channel();
/// client.blockchain_fetch_last_height(handler);
/// client.wait(Duration::from_secs(5)).await;
/// let height = reply.await??;
/// ```
pub fn reply_channel<R: Send + 'static>() -> (
    impl FnOnce(Result<R, ClientError>) + Send + 'static,
    oneshot::Receiver<Result<R, ClientError>>,
) {
    let (tx, rx) = oneshot::channel();
    let handler = move |result: Result<R, ClientError>| {
        // Receiver may have been dropped by a caller that stopped caring.
        let _ = tx.send(result);
    };
    (handler, rx)
}
