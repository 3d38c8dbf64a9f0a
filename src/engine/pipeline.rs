use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context};
use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::{RecorderConfig, SamplingTrigger, StoreBackend, StoreConfig};
use crate::core::error::FeedError;
use crate::core::record::Tick;
use crate::engine::stop::StopSignal;
use crate::feed::{decode_tick, FeedSource};
use crate::memory::TickCache;
use crate::monitor::{run_health_checks, Monitor};
use crate::sampling::{run_minute_clock, MinuteSampler};
use crate::storage::DiskWriter;
use crate::store::{KeyValueStore, MemoryStore, RedisStore};

const FEED_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const TRANSPORT_RETRY_DELAY: Duration = Duration::from_millis(100);
const SELF_TEST_KEY: &str = "tick_recorder:connection_test";

/// Opens the configured shared store
pub async fn connect_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.url)
                .await
                .with_context(|| format!("cannot connect to Redis at {}", config.url))?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            info!("Using in-process store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Wires the tick cache, sampler, disk writer and monitor for one topic.
///
/// Ingestion runs on the caller's task; the flush loop, the minute clock
/// and the health probe run as spawned tasks sharing one [`StopSignal`].
pub struct Pipeline {
    config: RecorderConfig,
    exchange: String,
    data_type: String,
    store: Arc<dyn KeyValueStore>,
    monitor: Arc<Monitor>,
    cache: Arc<TickCache>,
    sampler: Arc<MinuteSampler>,
    writer: Arc<DiskWriter>,
    stop: StopSignal,
}

impl Pipeline {
    /// Builds the pipeline after checking the store answers and round-trips a key
    pub async fn new(config: RecorderConfig, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        config.validate()?;
        let (exchange, data_type) = config.instrument_class()?;

        store.ping().await.context("shared store is unreachable")?;
        store.set(SELF_TEST_KEY, "ok".to_string()).await?;
        let echoed = store.get(SELF_TEST_KEY).await?;
        store.del(SELF_TEST_KEY).await?;
        ensure!(echoed.as_deref() == Some("ok"), "shared store failed the write/read self-test");

        let monitor = Arc::new(Monitor::new(config.monitor.stats_interval()));
        let cache = Arc::new(TickCache::new(store.clone(), monitor.clone(), config.tick_cache.clone()));
        let sampler = Arc::new(MinuteSampler::new(
            store.clone(),
            monitor.clone(),
            config.sampler.clone(),
            exchange.clone(),
            data_type.clone(),
            config.recording.sample_dir.clone(),
        ));
        let writer = Arc::new(DiskWriter::new(
            config.recording.tick_dir.clone(),
            exchange.clone(),
            data_type.clone(),
            config.disk_writer.flush_interval(),
            monitor.clone(),
        ));

        info!(topic = %config.topic, exchange = %exchange, data_type = %data_type, "Pipeline initialized");
        Ok(Self {
            config,
            exchange,
            data_type,
            store,
            monitor,
            cache,
            sampler,
            writer,
            stop: StopSignal::new(),
        })
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &Arc<TickCache> {
        &self.cache
    }

    pub fn sampler(&self) -> &Arc<MinuteSampler> {
        &self.sampler
    }

    pub fn writer(&self) -> &Arc<DiskWriter> {
        &self.writer
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Handle that stops every loop of this pipeline
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Decodes and ingests one raw feed message; false if it was dropped
    pub async fn process_message(&self, raw: &str) -> bool {
        match decode_tick(raw, Utc::now()) {
            Ok(tick) => self.process_tick(&tick).await,
            Err(e) => {
                error!("Dropping feed message: {}", e);
                self.monitor.track_dropped_message();
                false
            }
        }
    }

    /// Buffers a tick in the tick cache and the sampler's minute buckets.
    ///
    /// Store failures are recorded and swallowed; the tick counts as processed.
    pub async fn process_tick(&self, tick: &Tick) -> bool {
        let id = tick.instrument();
        if !id.in_class(&self.exchange, &self.data_type) {
            warn!(instrument = %id, topic = %self.config.topic, "Tick outside the topic's instrument class");
            self.monitor.track_dropped_message();
            return false;
        }

        self.monitor.track_tick(id, tick.event_time());
        if let Err(e) = self.cache.add_tick(tick).await {
            self.monitor.track_error("cache_add", Some(id), &e.to_string());
        }
        if let Err(e) = self.sampler.add_to_buffer(tick).await {
            self.monitor.track_error("buffer_add", Some(id), &e.to_string());
        }
        true
    }

    fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![tokio::spawn(
            self.writer
                .clone()
                .start_flush_loop(self.cache.clone(), self.stop.clone()),
        )];

        if self.config.sampler.trigger == SamplingTrigger::Clock {
            handles.push(tokio::spawn(run_minute_clock(
                self.sampler.clone(),
                self.config.sampler.grace(),
                self.stop.clone(),
            )));
        }

        handles.push(tokio::spawn(run_health_checks(
            self.monitor.clone(),
            self.store.clone(),
            self.config.monitor.health_check_interval(),
            self.stop.clone(),
        )));
        handles
    }

    /// Consumes `feed` until it closes or the stop handle fires.
    ///
    /// Background loops are stopped and awaited before returning, which
    /// includes the flush loop's final pass.
    pub async fn run<F: FeedSource>(&self, mut feed: F) -> anyhow::Result<()> {
        let handles = self.spawn_background();
        info!(topic = %self.config.topic, trigger = ?self.config.sampler.trigger, "Consuming feed");

        while self.stop.is_running() {
            match feed.poll(FEED_POLL_TIMEOUT).await {
                Ok(Some(raw)) => {
                    self.process_message(&raw).await;
                }
                Ok(None) => self.monitor.maybe_report(),
                Err(FeedError::Closed) => {
                    info!("Feed closed");
                    break;
                }
                Err(e) => {
                    self.monitor.track_error("transport", None, &e.to_string());
                    self.stop.sleep(TRANSPORT_RETRY_DELAY).await;
                }
            }
        }

        self.stop.stop();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Background task failed: {}", e);
            }
        }
        self.monitor.report();
        info!("Pipeline stopped");
        Ok(())
    }
}
