//! Correlation IDs for request tracking.
//!
//! Every outbound call carries a 32-bit id drawn from one counter shared by
//! all call types, so two outstanding calls never collide even when their
//! handlers live in different maps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation ID matching a reply frame to the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u32);

impl CorrelationId {
    /// Wrap a raw id read from the wire.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value written to the wire.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CorrelationId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<CorrelationId> for u32 {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

/// Monotonically increasing, wrapping id source.
///
/// Not thread-safe on its own; the dispatcher keeps it under the same lock
/// as the handler maps so that allocation and registration are one step.
#[derive(Debug, Default)]
pub struct CorrelationCounter {
    last: u32,
}

impl CorrelationCounter {
    /// Start counting after `last`.
    pub fn starting_after(last: u32) -> Self {
        Self { last }
    }

    /// Next id, skipping any the caller reports as still in use.
    ///
    /// `in_use` is only consulted after wraparound could have caught up
    /// with an outstanding id, so it is usually called once.
    pub fn next(&mut self, in_use: impl Fn(CorrelationId) -> bool) -> CorrelationId {
        loop {
            self.last = self.last.wrapping_add(1);
            let candidate = CorrelationId(self.last);
            if !in_use(candidate) {
                return candidate;
            }
        }
    }

    /// Last id handed out.
    pub fn last(&self) -> CorrelationId {
        CorrelationId(self.last)
    }
}
