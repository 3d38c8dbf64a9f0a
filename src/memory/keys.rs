//! Key schema of the shared store.
//!
//! ```text
//! crypto_ticks:<exchange>:<type>:<symbol>:<YYYY-MM-DD>:<HH>             hour bucket (tail = newest)
//! crypto_ticks_sample:<exchange>:<type>:<symbol>:<YYYY-MM-DD>:<HH>:<MM> minute bucket (head = newest)
//! sampled:<exchange>:<type>:<symbol>                                     latest sample
//! sampled:<exchange>:<type>:<symbol>:window                              sample window (tail = newest)
//! latest_samples:<exchange>:<type>[:<symbol>]                            pub/sub channels
//! ```

use chrono::{DateTime, Utc};

use crate::core::time::{hour_bucket, minute_bucket};
use crate::core::types::InstrumentId;

pub const TICK_PREFIX: &str = "crypto_ticks";
pub const MINUTE_PREFIX: &str = "crypto_ticks_sample";
pub const SAMPLE_PREFIX: &str = "sampled";
pub const CHANNEL_PREFIX: &str = "latest_samples";
pub const TEMP_PREFIX: &str = "temp";

#[inline]
fn instrument_key(prefix: &str, id: &InstrumentId) -> String {
    format!("{}:{}:{}:{}", prefix, id.exchange, id.data_type, id.symbol)
}

/// Hour bucket holding raw ticks until the next flush
pub fn tick_bucket_key(id: &InstrumentId, event_time: &DateTime<Utc>) -> String {
    format!("{}:{}", instrument_key(TICK_PREFIX, id), hour_bucket(event_time))
}

/// Pattern matching every hour bucket of one instrument class
pub fn tick_class_pattern(exchange: &str, data_type: &str) -> String {
    format!("{}:{}:{}:*", TICK_PREFIX, exchange, data_type)
}

/// Short-lived per-minute buffer used to find the last tick before a boundary
pub fn minute_bucket_key(id: &InstrumentId, minute: &DateTime<Utc>) -> String {
    format!("{}:{}", instrument_key(MINUTE_PREFIX, id), minute_bucket(minute))
}

/// Pattern matching all minute buckets of one class for one minute
pub fn minute_class_pattern(exchange: &str, data_type: &str, minute: &DateTime<Utc>) -> String {
    format!(
        "{}:{}:{}:*:{}",
        MINUTE_PREFIX,
        exchange,
        data_type,
        minute_bucket(minute)
    )
}

pub fn sample_key(id: &InstrumentId) -> String {
    instrument_key(SAMPLE_PREFIX, id)
}

pub fn sample_window_key(id: &InstrumentId) -> String {
    format!("{}:window", sample_key(id))
}

pub fn instrument_channel(id: &InstrumentId) -> String {
    instrument_key(CHANNEL_PREFIX, id)
}

pub fn class_channel(exchange: &str, data_type: &str) -> String {
    format!("{}:{}:{}", CHANNEL_PREFIX, exchange, data_type)
}

/// Private name a bucket is renamed to while it is drained.
///
/// `pid` and `seq` keep two takes within one millisecond apart.
pub fn temp_key(key: &str, unix_millis: i64, pid: u32, seq: u64) -> String {
    format!("{}:{}:tmp{}-{}-{}", TEMP_PREFIX, key, unix_millis, pid, seq)
}

/// A parsed hour bucket key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickBucketKey {
    pub instrument: InstrumentId,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH`
    pub hour: String,
}

impl TickBucketKey {
    pub fn parse(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        match parts.as_slice() {
            [prefix, exchange, data_type, symbol, date, hour] if *prefix == TICK_PREFIX => {
                Some(Self {
                    instrument: InstrumentId::new(*exchange, *data_type, *symbol),
                    date: date.to_string(),
                    hour: hour.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Parses a minute bucket key into its instrument
pub fn parse_minute_bucket_key(key: &str) -> Option<InstrumentId> {
    let parts: Vec<&str> = key.split(':').collect();
    match parts.as_slice() {
        [prefix, exchange, data_type, symbol, _date, _hour, _minute] if *prefix == MINUTE_PREFIX => {
            Some(InstrumentId::new(*exchange, *data_type, *symbol))
        }
        _ => None,
    }
}

/// Sort token of a bucket key: its `date:hour` suffix, or `"0"` if absent
pub fn bucket_sort_token(key: &str) -> String {
    let parts: Vec<&str> = key.split(':').collect();
    if parts.len() < 2 {
        return "0".to_string();
    }
    format!("{}:{}", parts[parts.len() - 2], parts[parts.len() - 1])
}
