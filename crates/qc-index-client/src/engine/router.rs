//! Reply router.
//!
//! Matches an inbound frame to its handler by command token and
//! correlation id. Anything that does not match is dropped and counted.

use crate::domain::{ClientError, CorrelationId, SubscriptionEvent};
use crate::engine::dispatcher::Dispatcher;
use crate::engine::registry::notify;
use crate::engine::stats::ClientStats;
use crate::ports::{DomainCodec, Envelope};
use crate::protocol::{payload, Command, ResultShape};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of routing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// A single-shot handler ran.
    Completed,
    /// A subscription handler ran.
    Notified,
    /// Nothing ran.
    Discarded,
}

pub struct ReplyRouter<C: DomainCodec> {
    dispatcher: Arc<Dispatcher<C>>,
    codec: Arc<C>,
    stats: Arc<ClientStats>,
}

impl<C: DomainCodec> ReplyRouter<C> {
    pub fn new(dispatcher: Arc<Dispatcher<C>>, codec: Arc<C>, stats: Arc<ClientStats>) -> Self {
        Self {
            dispatcher,
            codec,
            stats,
        }
    }

    /// Route one reply or notification frame.
    pub fn route(&self, envelope: Envelope) -> Routed {
        let command = match envelope.command.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                warn!(correlation_id = %envelope.id, error = %err, "Discarding frame");
                return self.discard();
            }
        };
        let Some((status, body)) = payload::split_status(&envelope.payload) else {
            warn!(
                correlation_id = %envelope.id,
                command = %command,
                len = envelope.payload.len(),
                "Discarding frame without status"
            );
            return self.discard();
        };

        if command.shape() == ResultShape::Update {
            return self.route_update(command, envelope.id, status, &body);
        }

        let Some(pending) = self.dispatcher.take(command.shape(), envelope.id) else {
            debug!(
                correlation_id = %envelope.id,
                command = %command,
                "Discarding unmatched reply"
            );
            return self.discard();
        };

        if let Err(err) = ClientError::from_status(status) {
            ClientStats::bump(&self.stats.remote_errors);
            debug!(correlation_id = %envelope.id, code = status, "Remote error");
            pending.fail(err);
        } else if pending.complete(&self.codec, &body) {
            ClientStats::bump(&self.stats.completed);
            trace!(correlation_id = %envelope.id, command = %command, "Completed request");
        } else {
            warn!(correlation_id = %envelope.id, command = %command, "Reply body did not decode");
        }
        Routed::Completed
    }

    fn route_update(
        &self,
        command: Command,
        id: CorrelationId,
        status: u32,
        body: &[u8],
    ) -> Routed {
        if let Err(err) = ClientError::from_status(status) {
            let Some(handler) = self.dispatcher.take_subscription(id, command) else {
                return self.discard();
            };
            ClientStats::bump(&self.stats.remote_errors);
            warn!(correlation_id = %id, code = status, "Subscription rejected");
            notify(&handler, Err(err));
            return Routed::Notified;
        }

        let event = if command.is_notification() {
            match payload::decode_update(body) {
                Ok(update) => SubscriptionEvent::Update(update),
                Err(err) => {
                    warn!(correlation_id = %id, error = %err, "Discarding malformed notification");
                    return self.discard();
                }
            }
        } else {
            SubscriptionEvent::Subscribed
        };

        let Some(handler) = self.dispatcher.touch_subscription(id, command) else {
            debug!(correlation_id = %id, command = %command, "Discarding unmatched notification");
            return self.discard();
        };
        ClientStats::bump(&self.stats.notifications);
        notify(&handler, Ok(event));
        Routed::Notified
    }

    fn discard(&self) -> Routed {
        ClientStats::bump(&self.stats.discarded);
        Routed::Discarded
    }
}
