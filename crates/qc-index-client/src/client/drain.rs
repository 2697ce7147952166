//! The wait/monitor drain loop.

use super::IndexClient;
use crate::connection::Session;
use crate::domain::{ClientError, CodecError, TransportError};
use crate::engine::{ClientStats, PushChannel};
use crate::ports::{DomainCodec, Envelope, PushSocket};
use crate::protocol::Command;
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Until no single-shot handler is pending.
    Wait,
    /// Until the deadline, push sockets included.
    Monitor,
}

enum Step {
    Forward(Envelope),
    Reply(Result<Envelope, TransportError>),
    Block(Result<Bytes, TransportError>),
    Transaction(Result<Bytes, TransportError>),
    LoopbackClosed,
    Deadline,
}

#[derive(Debug)]
enum Exit {
    Settled,
    Deadline,
    Detached,
    QueryFailed(TransportError),
}

async fn recv_push(socket: &mut Option<Box<dyn PushSocket>>) -> Result<Bytes, TransportError> {
    match socket {
        Some(socket) => socket.recv().await,
        None => std::future::pending().await,
    }
}

impl<C: DomainCodec> IndexClient<C> {
    /// Drain replies until every single-shot handler has completed or
    /// `timeout` elapses.
    ///
    /// Queued requests, subscriptions included, are sent first. Handlers
    /// still pending at the deadline complete with [`ClientError::Timeout`].
    /// Returns how many were force-completed.
    pub async fn wait(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut slot = self.session.lock().await;
        let exit = match slot.as_mut() {
            Some(session) => self.drain(session, deadline, Mode::Wait).await,
            None => Exit::Detached,
        };

        let timed_out = match exit {
            Exit::Deadline => {
                let cleared = self.dispatcher.clear_pending(ClientError::Timeout);
                ClientStats::add(&self.stats.timeouts, cleared);
                if cleared > 0 {
                    warn!(cleared, ?timeout, "Requests timed out");
                }
                cleared
            }
            Exit::QueryFailed(err) => {
                *slot = None;
                self.fail_session(err);
                0
            }
            Exit::Settled | Exit::Detached => 0,
        };
        drop(slot);

        self.expire_idle_subscriptions();
        timed_out
    }

    /// [`wait`](Self::wait) with the configured default bound.
    pub async fn wait_default(&self) -> usize {
        self.wait(self.config.wait_timeout()).await
    }

    /// Drain push sockets, replies and notifications until `timeout`
    /// elapses. Nothing is force-completed.
    pub async fn monitor(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut slot = self.session.lock().await;
        let exit = match slot.as_mut() {
            Some(session) => self.drain(session, deadline, Mode::Monitor).await,
            None => Exit::Detached,
        };
        if let Exit::QueryFailed(err) = exit {
            *slot = None;
            self.fail_session(err);
        }
        drop(slot);

        self.expire_idle_subscriptions();
    }

    /// [`monitor`](Self::monitor) with the configured default bound.
    pub async fn monitor_default(&self) {
        self.monitor(self.config.monitor_timeout()).await
    }

    async fn drain(&self, session: &mut Session, deadline: Instant, mode: Mode) -> Exit {
        let monitoring = mode == Mode::Monitor;
        loop {
            if let Some(exit) = self.flush_loopback(session, deadline).await {
                return exit;
            }
            if Instant::now() >= deadline {
                return Exit::Deadline;
            }
            if mode == Mode::Wait && self.dispatcher.pending_count() == 0 {
                // Route whatever is already queued, then settle.
                match tokio::time::timeout(Duration::ZERO, session.query.recv()).await {
                    Ok(Ok(envelope)) => {
                        self.router.route(envelope);
                        continue;
                    }
                    Ok(Err(err)) => return Exit::QueryFailed(err),
                    Err(_) => return Exit::Settled,
                }
            }

            let step = {
                let Session {
                    query,
                    block,
                    transaction,
                    loopback,
                    ..
                } = &mut *session;
                tokio::select! {
                    biased;
                    envelope = loopback.recv() => match envelope {
                        Some(envelope) => Step::Forward(envelope),
                        None => Step::LoopbackClosed,
                    },
                    frame = query.recv() => Step::Reply(frame),
                    frame = recv_push(block), if monitoring => Step::Block(frame),
                    frame = recv_push(transaction), if monitoring => Step::Transaction(frame),
                    _ = tokio::time::sleep_until(deadline) => Step::Deadline,
                }
            };

            match step {
                Step::Forward(envelope) => self.forward(session, envelope).await,
                Step::Reply(Ok(envelope)) => {
                    self.router.route(envelope);
                }
                Step::Reply(Err(err)) => return Exit::QueryFailed(err),
                Step::Block(Ok(frame)) => {
                    self.deliver_push(&self.blocks, &frame, |body| self.codec.decode_block(body))
                }
                Step::Block(Err(err)) => {
                    warn!(channel = "block", error = %err, "Push socket failed");
                    session.block = None;
                }
                Step::Transaction(Ok(frame)) => self.deliver_push(&self.transactions, &frame, |body| {
                    self.codec.decode_transaction(body)
                }),
                Step::Transaction(Err(err)) => {
                    warn!(channel = "transaction", error = %err, "Push socket failed");
                    session.transaction = None;
                }
                Step::LoopbackClosed => return Exit::Detached,
                Step::Deadline => return Exit::Deadline,
            }
        }
    }

    /// Send every request already queued on the loopback.
    async fn flush_loopback(&self, session: &mut Session, deadline: Instant) -> Option<Exit> {
        while Instant::now() < deadline {
            match session.loopback.try_recv() {
                Ok(envelope) => self.forward(session, envelope).await,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(Exit::Detached),
            }
        }
        None
    }

    async fn forward(&self, session: &mut Session, envelope: Envelope) {
        let id = envelope.id;
        let command = envelope.command.parse::<Command>();
        trace!(correlation_id = %id, command = %envelope.command, "Forwarding request");

        if let Err(err) = session.query.send(envelope).await {
            ClientStats::bump(&self.stats.transport_failures);
            warn!(correlation_id = %id, error = %err, "Send failed");
            if let Ok(command) = command {
                self.dispatcher.fail(command, id, err.into());
            }
        }
    }

    fn deliver_push<T>(
        &self,
        channel: &PushChannel<T>,
        frame: &Bytes,
        decode: impl FnOnce(&[u8]) -> Result<T, CodecError>,
    ) {
        match decode(&frame[..]) {
            Ok(item) => {
                if channel.dispatch(item) {
                    ClientStats::bump(&self.stats.push_events);
                } else {
                    ClientStats::bump(&self.stats.discarded);
                    debug!(channel = channel.name(), "No handler installed");
                }
            }
            Err(err) => {
                ClientStats::bump(&self.stats.discarded);
                warn!(channel = channel.name(), error = %err, "Discarding undecodable push frame");
            }
        }
    }

    fn fail_session(&self, err: TransportError) {
        warn!(error = %err, "Query socket failed; session closed");
        let failed = self.dispatcher.clear_all(ClientError::Transport(err));
        ClientStats::add(&self.stats.transport_failures, failed);
        self.secure.store(false, Ordering::SeqCst);
    }

    fn expire_idle_subscriptions(&self) {
        if let Some(limit) = self.config.subscription_policy.idle_limit() {
            let expired = self.dispatcher.expire_idle(limit);
            ClientStats::add(&self.stats.timeouts, expired);
        }
    }
}
