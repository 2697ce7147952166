//! Wire protocol: command tokens and payload layouts.

pub mod commands;
pub mod payload;

pub use commands::{Command, ResultShape, UnknownCommand};
