//! # Adapters
//!
//! Concrete implementations of the ports:
//! - `memory`: in-process transport with scriptable services and publishers
//! - `raw`: pass-through codec over raw bytes

pub mod memory;
pub mod raw;

pub use memory::{reply_to, MemoryPublisher, MemoryService, MemoryTransport, Responder};
pub use raw::RawCodec;
