use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, warn};

use crate::core::config::TickCacheConfig;
use crate::core::error::CacheError;
use crate::core::record::{Tick, TickRecord};
use crate::memory::keys::{self, TickBucketKey};
use crate::monitor::Monitor;
use crate::store::{list_index, KeyValueStore};

/// What the disk writer needs from a tick buffer
#[async_trait]
pub trait FlushSource: Send + Sync {
    /// Buffers one tick
    async fn add(&self, tick: &Tick) -> Result<(), CacheError>;

    /// Bucket keys of one instrument class, oldest `date:hour` first
    async fn get_keys_to_flush(&self, exchange: &str, data_type: &str) -> Result<Vec<String>, CacheError>;

    /// Atomically takes every tick buffered under `key`, leaving it empty
    async fn get_and_clear_ticks(&self, key: &str) -> Result<Vec<TickRecord>, CacheError>;
}

/// Append-only hour buckets of raw ticks in the shared store.
///
/// Ticks are kept in arrival order. An arrival whose event time is older
/// than the bucket's tail is counted and logged but stored as-is.
pub struct TickCache {
    store: Arc<dyn KeyValueStore>,
    monitor: Arc<Monitor>,
    config: TickCacheConfig,
    out_of_order: AtomicU64,
    take_seq: AtomicU64,
}

impl TickCache {
    pub fn new(store: Arc<dyn KeyValueStore>, monitor: Arc<Monitor>, config: TickCacheConfig) -> Self {
        Self {
            store,
            monitor,
            config,
            out_of_order: AtomicU64::new(0),
            take_seq: AtomicU64::new(0),
        }
    }

    /// Ticks seen with an event time earlier than their bucket's tail
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order.load(Ordering::Relaxed)
    }

    pub async fn add_tick(&self, tick: &Tick) -> Result<(), CacheError> {
        let key = keys::tick_bucket_key(tick.instrument(), &tick.event_time());

        if let Some(raw) = self.store.lindex(&key, -1).await? {
            match serde_json::from_str::<TickRecord>(&raw) {
                Ok(latest) if tick.event_time() < latest.timestamp => {
                    let total = self.out_of_order.fetch_add(1, Ordering::Relaxed) + 1;
                    self.monitor.track_out_of_order();
                    warn!(
                        symbol = %tick.instrument().symbol,
                        new_tick = %tick.event_time(),
                        latest_tick = %latest.timestamp,
                        total,
                        "Out of order tick detected"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(key = %key, "Unreadable tail entry: {}", e),
            }
        }

        let payload = serde_json::to_string(&tick.to_record())?;
        self.store.rpush(&key, payload).await?;
        if self.config.max_len > 0 {
            let keep = list_index(self.config.max_len);
            self.store.ltrim(&key, -keep, -1).await?;
        }
        self.store.expire(&key, self.config.expiry()).await?;
        Ok(())
    }

    pub async fn keys_to_flush(&self, exchange: &str, data_type: &str) -> Result<Vec<String>, CacheError> {
        let mut found: Vec<String> = self
            .store
            .keys(&keys::tick_class_pattern(exchange, data_type))
            .await?
            .into_iter()
            .filter(|k| {
                TickBucketKey::parse(k)
                    .map_or(false, |parsed| parsed.instrument.in_class(exchange, data_type))
            })
            .collect();
        // stable: keys of the same hour keep store order
        found.sort_by_cached_key(|k| keys::bucket_sort_token(k));

        debug!(count = found.len(), first = ?found.first(), "Found keys to flush");
        Ok(found)
    }

    fn next_temp_key(&self, key: &str, unix_millis: i64) -> String {
        let seq = self.take_seq.fetch_add(1, Ordering::Relaxed);
        keys::temp_key(key, unix_millis, std::process::id(), seq)
    }

    pub async fn take_ticks(&self, key: &str) -> Result<Vec<TickRecord>, CacheError> {
        let temp = self.next_temp_key(key, Utc::now().timestamp_millis());

        // After the rename new ticks start a fresh list under `key`
        if !self.store.rename(key, &temp).await? {
            return Ok(Vec::new());
        }

        let raw = self.store.lrange(&temp, 0, -1).await;
        if let Err(e) = self.store.del(&temp).await {
            warn!(key = %temp, "Failed to delete drained bucket: {}", e);
        }

        let mut ticks = Vec::new();
        for entry in raw? {
            match serde_json::from_str::<TickRecord>(&entry) {
                Ok(record) => ticks.push(record),
                Err(e) => {
                    error!(key = %key, "Skipping unparseable tick: {}", e);
                    self.monitor.track_error("tick_parse", None, &e.to_string());
                }
            }
        }
        Ok(ticks)
    }
}

#[async_trait]
impl FlushSource for TickCache {
    async fn add(&self, tick: &Tick) -> Result<(), CacheError> {
        self.add_tick(tick).await
    }

    async fn get_keys_to_flush(&self, exchange: &str, data_type: &str) -> Result<Vec<String>, CacheError> {
        self.keys_to_flush(exchange, data_type).await
    }

    async fn get_and_clear_ticks(&self, key: &str) -> Result<Vec<TickRecord>, CacheError> {
        self.take_ticks(key).await
    }
}
