//! Counter values, commands and the replicated engine that applies them.

pub mod client;
pub mod command;
pub mod engine;
pub mod entry;

pub use client::CounterClient;
pub use command::CounterCommand;
pub use engine::{CounterEngine, DEFAULT_BUCKET};
pub use entry::CounterEntry;
