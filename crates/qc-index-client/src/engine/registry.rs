//! Handler registry - one handler map per result shape plus the
//! persistent subscription table.
//!
//! An entry's presence IS the pending-request record: it exists from
//! registration until a reply, a send failure or a forced clear removes it.
//! Filter subscriptions are the one exception: they survive every event
//! and leave only on an error status, idle expiry or disconnect.

use crate::domain::{
    ClientError, CorrelationId, Handler, HandlerMap, SubscriptionEvent, SubscriptionFilter,
    TransactionIndex, UpdateHandler,
};
use crate::ports::DomainCodec;
use crate::protocol::{payload, Command, ResultShape};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single-shot handler tagged with the map it lives in.
pub enum Pending<C: DomainCodec> {
    Result(Handler<()>),
    Height(Handler<u32>),
    TransactionIndex(Handler<TransactionIndex>),
    Block(Handler<C::Block>),
    Header(Handler<C::Header>),
    Transaction(Handler<C::Transaction>),
    History(Handler<C::History>),
    Stealth(Handler<C::Stealth>),
}

impl<C: DomainCodec> Pending<C> {
    pub fn shape(&self) -> ResultShape {
        match self {
            Pending::Result(_) => ResultShape::Result,
            Pending::Height(_) => ResultShape::Height,
            Pending::TransactionIndex(_) => ResultShape::TransactionIndex,
            Pending::Block(_) => ResultShape::Block,
            Pending::Header(_) => ResultShape::Header,
            Pending::Transaction(_) => ResultShape::Transaction,
            Pending::History(_) => ResultShape::History,
            Pending::Stealth(_) => ResultShape::Stealth,
        }
    }

    /// Invoke with an error and no result.
    pub fn fail(self, error: ClientError) {
        match self {
            Pending::Result(handler) => handler(Err(error)),
            Pending::Height(handler) => handler(Err(error)),
            Pending::TransactionIndex(handler) => handler(Err(error)),
            Pending::Block(handler) => handler(Err(error)),
            Pending::Header(handler) => handler(Err(error)),
            Pending::Transaction(handler) => handler(Err(error)),
            Pending::History(handler) => handler(Err(error)),
            Pending::Stealth(handler) => handler(Err(error)),
        }
    }

    /// Decode a success body into this entry's shape and invoke.
    ///
    /// Returns whether the body decoded.
    pub fn complete(self, codec: &C, body: &[u8]) -> bool {
        fn deliver<R>(handler: Handler<R>, decoded: Result<R, ClientError>) -> bool {
            let ok = decoded.is_ok();
            handler(decoded);
            ok
        }

        match self {
            Pending::Result(handler) => deliver(handler, Ok(())),
            Pending::Height(handler) => {
                deliver(handler, payload::decode_height(body).map_err(Into::into))
            }
            Pending::TransactionIndex(handler) => deliver(
                handler,
                payload::decode_transaction_index(body).map_err(Into::into),
            ),
            Pending::Block(handler) => deliver(handler, codec.decode_block(body).map_err(Into::into)),
            Pending::Header(handler) => {
                deliver(handler, codec.decode_header(body).map_err(Into::into))
            }
            Pending::Transaction(handler) => {
                deliver(handler, codec.decode_transaction(body).map_err(Into::into))
            }
            Pending::History(handler) => {
                deliver(handler, codec.decode_history(body).map_err(Into::into))
            }
            Pending::Stealth(handler) => {
                deliver(handler, codec.decode_stealth(body).map_err(Into::into))
            }
        }
    }
}

/// Shared, lockable subscription handler.
pub type SharedUpdateHandler = Arc<Mutex<UpdateHandler>>;

/// Invoke a subscription handler. Never called with registry locks held.
pub fn notify(handler: &SharedUpdateHandler, event: Result<SubscriptionEvent, ClientError>) {
    let mut handler = handler.lock();
    (*handler)(event);
}

struct SubscriptionRecord {
    handler: SharedUpdateHandler,
    filter: SubscriptionFilter,
    last_activity: Instant,
}

/// All handler maps of one client.
pub struct HandlerRegistry<C: DomainCodec> {
    results: HandlerMap<()>,
    heights: HandlerMap<u32>,
    transaction_indexes: HandlerMap<TransactionIndex>,
    blocks: HandlerMap<C::Block>,
    headers: HandlerMap<C::Header>,
    transactions: HandlerMap<C::Transaction>,
    histories: HandlerMap<C::History>,
    stealths: HandlerMap<C::Stealth>,
    subscriptions: HashMap<CorrelationId, SubscriptionRecord>,
}

impl<C: DomainCodec> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DomainCodec> HandlerRegistry<C> {
    pub fn new() -> Self {
        Self {
            results: HandlerMap::new(),
            heights: HandlerMap::new(),
            transaction_indexes: HandlerMap::new(),
            blocks: HandlerMap::new(),
            headers: HandlerMap::new(),
            transactions: HandlerMap::new(),
            histories: HandlerMap::new(),
            stealths: HandlerMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    /// Register a single-shot handler in the map matching its shape.
    pub fn insert(&mut self, id: CorrelationId, pending: Pending<C>) {
        match pending {
            Pending::Result(handler) => self.results.insert(id, handler),
            Pending::Height(handler) => self.heights.insert(id, handler),
            Pending::TransactionIndex(handler) => self.transaction_indexes.insert(id, handler),
            Pending::Block(handler) => self.blocks.insert(id, handler),
            Pending::Header(handler) => self.headers.insert(id, handler),
            Pending::Transaction(handler) => self.transactions.insert(id, handler),
            Pending::History(handler) => self.histories.insert(id, handler),
            Pending::Stealth(handler) => self.stealths.insert(id, handler),
        }
    }

    /// Remove the entry for `id` from the map for `shape` only.
    pub fn take(&mut self, shape: ResultShape, id: CorrelationId) -> Option<Pending<C>> {
        match shape {
            ResultShape::Result => self.results.remove(id).map(Pending::Result),
            ResultShape::Height => self.heights.remove(id).map(Pending::Height),
            ResultShape::TransactionIndex => self
                .transaction_indexes
                .remove(id)
                .map(Pending::TransactionIndex),
            ResultShape::Block => self.blocks.remove(id).map(Pending::Block),
            ResultShape::Header => self.headers.remove(id).map(Pending::Header),
            ResultShape::Transaction => self.transactions.remove(id).map(Pending::Transaction),
            ResultShape::History => self.histories.remove(id).map(Pending::History),
            ResultShape::Stealth => self.stealths.remove(id).map(Pending::Stealth),
            ResultShape::Update => None,
        }
    }

    /// Whether `id` is held by any map, subscriptions included.
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.results.contains(id)
            || self.heights.contains(id)
            || self.transaction_indexes.contains(id)
            || self.blocks.contains(id)
            || self.headers.contains(id)
            || self.transactions.contains(id)
            || self.histories.contains(id)
            || self.stealths.contains(id)
            || self.subscriptions.contains_key(&id)
    }

    /// Number of single-shot handlers still waiting.
    pub fn pending_count(&self) -> usize {
        self.results.len()
            + self.heights.len()
            + self.transaction_indexes.len()
            + self.blocks.len()
            + self.headers.len()
            + self.transactions.len()
            + self.histories.len()
            + self.stealths.len()
    }

    /// Empty every single-shot map.
    pub fn drain_pending(&mut self) -> Vec<(CorrelationId, Pending<C>)> {
        let mut drained = Vec::with_capacity(self.pending_count());
        drained.extend(self.results.drain().into_iter().map(|(id, h)| (id, Pending::Result(h))));
        drained.extend(self.heights.drain().into_iter().map(|(id, h)| (id, Pending::Height(h))));
        drained.extend(
            self.transaction_indexes
                .drain()
                .into_iter()
                .map(|(id, h)| (id, Pending::TransactionIndex(h))),
        );
        drained.extend(self.blocks.drain().into_iter().map(|(id, h)| (id, Pending::Block(h))));
        drained.extend(self.headers.drain().into_iter().map(|(id, h)| (id, Pending::Header(h))));
        drained.extend(
            self.transactions
                .drain()
                .into_iter()
                .map(|(id, h)| (id, Pending::Transaction(h))),
        );
        drained.extend(
            self.histories
                .drain()
                .into_iter()
                .map(|(id, h)| (id, Pending::History(h))),
        );
        drained.extend(
            self.stealths
                .drain()
                .into_iter()
                .map(|(id, h)| (id, Pending::Stealth(h))),
        );
        drained
    }

    pub fn insert_subscription(
        &mut self,
        id: CorrelationId,
        filter: SubscriptionFilter,
        handler: UpdateHandler,
    ) {
        self.subscriptions.insert(
            id,
            SubscriptionRecord {
                handler: Arc::new(Mutex::new(handler)),
                filter,
                last_activity: Instant::now(),
            },
        );
    }

    /// Look up the subscription `command` addresses and mark it active.
    pub fn touch_subscription(
        &mut self,
        id: CorrelationId,
        command: Command,
    ) -> Option<SharedUpdateHandler> {
        let record = self.subscriptions.get_mut(&id)?;
        if !command.accepts(&record.filter) {
            return None;
        }
        record.last_activity = Instant::now();
        Some(record.handler.clone())
    }

    /// Remove the subscription `command` addresses.
    pub fn take_subscription(
        &mut self,
        id: CorrelationId,
        command: Command,
    ) -> Option<SharedUpdateHandler> {
        match self.subscriptions.get(&id) {
            Some(record) if command.accepts(&record.filter) => self.remove_subscription(id),
            _ => None,
        }
    }

    pub fn remove_subscription(&mut self, id: CorrelationId) -> Option<SharedUpdateHandler> {
        self.subscriptions.remove(&id).map(|record| record.handler)
    }

    /// Live subscriptions and their filters, ordered by id.
    pub fn subscriptions(&self) -> Vec<(CorrelationId, SubscriptionFilter)> {
        let mut listed: Vec<_> = self
            .subscriptions
            .iter()
            .map(|(id, record)| (*id, record.filter.clone()))
            .collect();
        listed.sort_by_key(|(id, _)| *id);
        listed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn drain_subscriptions(&mut self) -> Vec<(CorrelationId, SharedUpdateHandler)> {
        self.subscriptions
            .drain()
            .map(|(id, record)| (id, record.handler))
            .collect()
    }

    /// Remove subscriptions with no activity for longer than `limit`.
    pub fn expire_idle(
        &mut self,
        now: Instant,
        limit: Duration,
    ) -> Vec<(CorrelationId, SharedUpdateHandler)> {
        let expired: Vec<CorrelationId> = self
            .subscriptions
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.last_activity) > limit)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.remove_subscription(id).map(|handler| (id, handler)))
            .collect()
    }
}
