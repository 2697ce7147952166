//! Client counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals, updated lock-free from the dispatch and drain paths.
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Handlers registered under a fresh correlation id
    pub registered: AtomicU64,
    /// Handlers completed by a matching success reply
    pub completed: AtomicU64,
    /// Replies carrying a non-zero status
    pub remote_errors: AtomicU64,
    /// Handlers force-completed by a wait deadline
    pub timeouts: AtomicU64,
    /// Handlers failed by a send error or a dead socket
    pub transport_failures: AtomicU64,
    /// Frames dropped: unknown command, short frame, unmatched id or bad body
    pub discarded: AtomicU64,
    /// Subscription events delivered
    pub notifications: AtomicU64,
    /// Block and transaction push frames delivered
    pub push_events: AtomicU64,
}

impl ClientStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            push_events: self.push_events.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub remote_errors: u64,
    pub timeouts: u64,
    pub transport_failures: u64,
    pub discarded: u64,
    pub notifications: u64,
    pub push_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = ClientStats::default();
        ClientStats::bump(&stats.registered);
        ClientStats::bump(&stats.registered);
        ClientStats::add(&stats.timeouts, 3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.registered, 2);
        assert_eq!(snapshot.timeouts, 3);
        assert_eq!(snapshot.completed, 0);

        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["timeouts"], 3);
    }
}
