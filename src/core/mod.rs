pub mod config;
pub mod error;
pub mod record;
pub mod time;
pub mod types;

pub use config::{RecorderConfig, SamplingTrigger, StoreBackend};
pub use error::{CacheError, ConfigError, FeedError, SamplingError, StoreError, WriterError};
pub use record::{SampleEnvelope, Tick, TickRecord};
pub use types::{InstrumentId, QuoteLevel, Spreads};
