// Tick recorder: tick cache, minute sampler and disk flush
// Core modules
pub mod core;
pub mod store;
pub mod memory;
pub mod sampling;
pub mod storage;
pub mod monitor;
pub mod feed;
pub mod engine;
pub mod utils;

// Re-exports of common types
pub use crate::core::config::RecorderConfig;
pub use crate::core::record::{Tick, TickRecord};
pub use crate::core::types::InstrumentId;
pub use crate::engine::{connect_store, Pipeline, StopSignal};
pub use crate::memory::{FlushSource, TickCache};
pub use crate::monitor::Monitor;
pub use crate::sampling::MinuteSampler;
pub use crate::storage::DiskWriter;
pub use crate::store::{KeyValueStore, MemoryStore, RedisStore};

// Version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests;
