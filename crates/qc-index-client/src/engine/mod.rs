//! # Engine
//!
//! Correlation and dispatch core: the handler registry, the dispatcher
//! that feeds the loopback, the router that matches replies, push
//! channels and counters.

pub mod dispatcher;
pub mod push;
pub mod registry;
pub mod router;
pub mod stats;

pub use dispatcher::{Dispatcher, Outbound};
pub use push::PushChannel;
pub use registry::{HandlerRegistry, Pending};
pub use router::{ReplyRouter, Routed};
pub use stats::{ClientStats, StatsSnapshot};
