pub mod keys;
pub mod tick_cache;

pub use tick_cache::{FlushSource, TickCache};
