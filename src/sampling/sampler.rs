use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::core::config::{SamplerConfig, SamplingTrigger};
use crate::core::error::{SamplingError, StoreError};
use crate::core::record::{SampleEnvelope, Tick, TickRecord};
use crate::core::time::{day_string, floor_minute};
use crate::core::types::InstrumentId;
use crate::memory::keys;
use crate::monitor::Monitor;
use crate::storage::jsonl;
use crate::store::{list_index, KeyValueStore};

const UNSET: i64 = i64::MIN;

/// Why an instrument got no sample for a minute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing buffered in the minute before the boundary
    NoTick,
    /// The newest tick is older than the staleness bound
    Stale { age: Duration },
    /// The newest tick is not strictly before the boundary
    NotBeforeBoundary { tick_time: DateTime<Utc> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoTick => write!(f, "No valid tick found"),
            SkipReason::Stale { age } => write!(f, "Tick too old ({}s)", age.num_seconds()),
            SkipReason::NotBeforeBoundary { tick_time } => {
                write!(f, "Tick time {} not before sampling time", tick_time)
            }
        }
    }
}

/// Candidate for one instrument's sample
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Selected(TickRecord),
    Skipped(SkipReason),
}

/// Outcome of one sampling pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleReport {
    pub minute: DateTime<Utc>,
    /// New samples written to every destination
    pub sampled: usize,
    /// Minutes already sampled; only the latest key was rewritten
    pub resampled: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl SampleReport {
    fn new(minute: DateTime<Utc>) -> Self {
        Self {
            minute,
            sampled: 0,
            resampled: 0,
            skipped: 0,
            errors: 0,
        }
    }
}

/// Builds one sample per active instrument at every minute boundary.
///
/// Each tick is also pushed onto a short per-minute bucket (newest at the
/// head). The sample for boundary `M` is the newest entry of the `M - 1`
/// bucket, provided it is strictly before `M` and within the staleness
/// bound. The high-water mark is process-local; both sampling triggers
/// claim minutes through it, so one process samples a minute once.
pub struct MinuteSampler {
    store: Arc<dyn KeyValueStore>,
    monitor: Arc<Monitor>,
    config: SamplerConfig,
    exchange: String,
    data_type: String,
    sample_dir: PathBuf,
    last_sampled: AtomicI64,
}

impl MinuteSampler {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        monitor: Arc<Monitor>,
        config: SamplerConfig,
        exchange: impl Into<String>,
        data_type: impl Into<String>,
        sample_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            monitor,
            config,
            exchange: exchange.into(),
            data_type: data_type.into(),
            sample_dir: sample_dir.into(),
            last_sampled: AtomicI64::new(UNSET),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Buffers a tick under its own event minute.
    ///
    /// With the tick trigger, a tick from a minute newer than the last
    /// sampled one runs the sampling pass for its minute before returning.
    pub async fn add_to_buffer(&self, tick: &Tick) -> Result<Option<SampleReport>, SamplingError> {
        let _timer = self.monitor.time("add_to_buffer");
        let key = keys::minute_bucket_key(tick.instrument(), &tick.event_time());
        let payload = serde_json::to_string(&tick.to_record())?;

        self.store.lpush(&key, payload).await?;
        let last = list_index(self.config.max_len.max(1)) - 1;
        self.store.ltrim(&key, 0, last).await?;
        self.store.expire(&key, self.config.expiry()).await?;

        if self.config.trigger != SamplingTrigger::Tick {
            return Ok(None);
        }

        let current_minute = floor_minute(tick.event_time());
        if !self.claim_minute(current_minute) {
            return Ok(None);
        }
        info!(
            trigger_time = %tick.event_time(),
            minute = %current_minute,
            symbol = %tick.instrument().symbol,
            "New minute detected"
        );
        // a failed pass is already recorded; the tick itself was buffered
        Ok(self.create_samples_for_minute(current_minute).await.ok())
    }

    /// Advances the high-water mark to `minute`.
    ///
    /// Returns false when `minute` is not newer than the last claimed one.
    pub fn claim_minute(&self, minute: DateTime<Utc>) -> bool {
        self.advance_to(minute).is_some()
    }

    /// CAS loop behind [`claim_minute`](Self::claim_minute); yields the previous mark on success
    fn advance_to(&self, minute: DateTime<Utc>) -> Option<i64> {
        let m = minute.timestamp();
        let mut current = self.last_sampled.load(Ordering::Acquire);
        loop {
            if current != UNSET && m <= current {
                return None;
            }
            match self
                .last_sampled
                .compare_exchange_weak(current, m, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(previous) => return Some(previous),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn last_sampled_minute(&self) -> Option<DateTime<Utc>> {
        match self.last_sampled.load(Ordering::Acquire) {
            UNSET => None,
            secs => Utc.timestamp_opt(secs, 0).single(),
        }
    }

    /// Claims the boundary at or before `now`, if not yet sampled.
    ///
    /// Boundaries jumped over since the previous claim, e.g. after a pass
    /// overran the next minute, are recorded on the monitor as missed.
    pub fn sample_due(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let boundary = floor_minute(now);
        let previous = self.advance_to(boundary)?;
        if previous != UNSET {
            let missed = (boundary.timestamp() - previous) / 60 - 1;
            if missed > 0 {
                if let Some(first) = Utc.timestamp_opt(previous + 60, 0).single() {
                    self.monitor.track_missed_minutes(first, missed as u64);
                }
            }
        }
        Some(boundary)
    }

    /// Samples every active instrument of this class at `minute`.
    ///
    /// Failures are isolated per instrument and counted in the report; only
    /// a failure to discover the instruments aborts the pass. Every failure
    /// is recorded on the monitor.
    pub async fn create_samples_for_minute(&self, minute: DateTime<Utc>) -> Result<SampleReport, SamplingError> {
        let _timer = self.monitor.time("sampling");
        let instruments = match self.active_instruments(minute).await {
            Ok(found) => found,
            Err(e) => {
                self.monitor.track_error("sampling_all", None, &e.to_string());
                return Err(e.into());
            }
        };
        debug!(minute = %minute, count = instruments.len(), "Active instruments");

        let mut report = SampleReport::new(minute);
        for id in &instruments {
            match self.sample_instrument(id, minute).await {
                Ok(Some(true)) => {
                    report.sampled += 1;
                    self.monitor.track_sample(id, minute);
                }
                Ok(Some(false)) => report.resampled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    self.monitor.track_error("sampling", Some(id), &e.to_string());
                }
            }
        }

        info!(
            minute = %minute,
            sampled = report.sampled,
            resampled = report.resampled,
            skipped = report.skipped,
            errors = report.errors,
            "Sampling pass complete"
        );
        Ok(report)
    }

    /// `Some(true)` for a new sample, `Some(false)` for a rewrite, `None` when skipped
    async fn sample_instrument(&self, id: &InstrumentId, minute: DateTime<Utc>) -> Result<Option<bool>, SamplingError> {
        match self.last_tick_before_minute(id, minute).await? {
            Selection::Selected(tick) => {
                let sample = tick.into_sample(minute);
                self.save_sample(id, &sample, minute).await.map(Some)
            }
            Selection::Skipped(reason) => {
                self.monitor.track_skipped_minute(id, minute, &reason.to_string());
                Ok(None)
            }
        }
    }

    /// Instruments of this class with a minute bucket at `minute` or the minute before
    pub async fn active_instruments(&self, minute: DateTime<Utc>) -> Result<BTreeSet<InstrumentId>, StoreError> {
        let mut found = BTreeSet::new();
        for m in [minute, minute - Duration::minutes(1)] {
            let pattern = keys::minute_class_pattern(&self.exchange, &self.data_type, &m);
            for key in self.store.keys(&pattern).await? {
                if let Some(id) = keys::parse_minute_bucket_key(&key) {
                    if id.in_class(&self.exchange, &self.data_type) {
                        found.insert(id);
                    }
                }
            }
        }
        Ok(found)
    }

    /// Newest buffered tick of the minute before `minute`, checked for staleness
    pub async fn last_tick_before_minute(&self, id: &InstrumentId, minute: DateTime<Utc>) -> Result<Selection, SamplingError> {
        let key = keys::minute_bucket_key(id, &(minute - Duration::minutes(1)));
        let Some(raw) = self.store.lindex(&key, 0).await? else {
            return Ok(Selection::Skipped(SkipReason::NoTick));
        };
        let tick: TickRecord = serde_json::from_str(&raw)?;

        let age = minute - tick.timestamp;
        if age > self.config.max_tick_age() {
            return Ok(Selection::Skipped(SkipReason::Stale { age }));
        }
        if age < Duration::zero() {
            // diagnostic only; the boundary check below decides
            warn!(instrument = %id, minute = %minute, tick_time = %tick.timestamp, "Negative sampling time difference");
        }
        if tick.timestamp >= minute {
            return Ok(Selection::Skipped(SkipReason::NotBeforeBoundary {
                tick_time: tick.timestamp,
            }));
        }
        Ok(Selection::Selected(tick))
    }

    /// Writes a sample to the latest key, the channels, the window and disk.
    ///
    /// If the window's newest entry is already this minute, only the latest
    /// key is rewritten and `false` is returned.
    async fn save_sample(&self, id: &InstrumentId, sample: &TickRecord, minute: DateTime<Utc>) -> Result<bool, SamplingError> {
        let payload = serde_json::to_string(sample)?;
        let sample_key = keys::sample_key(id);
        let window_key = keys::sample_window_key(id);

        self.store.set(&sample_key, payload.clone()).await?;

        if let Some(tail) = self.store.lindex(&window_key, -1).await? {
            if let Ok(prev) = serde_json::from_str::<TickRecord>(&tail) {
                if prev.sampling_timestamp == minute {
                    debug!(instrument = %id, minute = %minute, "Minute already sampled");
                    return Ok(false);
                }
            }
        }

        self.publish_sample(id, sample).await?;

        self.store.rpush(&window_key, payload).await?;
        let keep = list_index(self.config.samples_to_keep);
        self.store.ltrim(&window_key, -keep, -1).await?;

        jsonl::append_records_blocking(self.sample_path(id, minute), vec![sample.clone()]).await?;
        debug!(instrument = %id, tick_time = %sample.timestamp, minute = %minute, "Saved sample");
        Ok(true)
    }

    async fn publish_sample(&self, id: &InstrumentId, sample: &TickRecord) -> Result<(), SamplingError> {
        let envelope = SampleEnvelope {
            data: sample.clone(),
            publish_time: Utc::now(),
        };
        let message = serde_json::to_string(&envelope)?;
        self.store.publish(&keys::instrument_channel(id), message.clone()).await?;
        self.store
            .publish(&keys::class_channel(&id.exchange, &id.data_type), message)
            .await?;
        Ok(())
    }

    /// `<sample_dir>/sampled/<exchange>/<data_type>/<symbol>/<YYYY-MM-DD>_sampled.jsonl`
    pub fn sample_path(&self, id: &InstrumentId, minute: DateTime<Utc>) -> PathBuf {
        self.sample_dir
            .join("sampled")
            .join(&id.exchange)
            .join(&id.data_type)
            .join(&id.symbol)
            .join(format!("{}_sampled.jsonl", day_string(&minute)))
    }

    /// The most recent sample of an instrument
    pub async fn latest_sample(&self, id: &InstrumentId) -> Result<Option<TickRecord>, SamplingError> {
        match self.store.get(&keys::sample_key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Retained samples of an instrument, oldest first
    pub async fn sample_window(&self, id: &InstrumentId) -> Result<Vec<TickRecord>, SamplingError> {
        self.store
            .lrange(&keys::sample_window_key(id), 0, -1)
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(SamplingError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::core::time::parse_timestamp;
    use crate::core::types::QuoteLevel;
    use crate::store::MemoryStore;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_timestamp(raw).unwrap()
    }

    fn id(symbol: &str) -> InstrumentId {
        InstrumentId::new("binance", "quote", symbol)
    }

    fn tick(symbol: &str, ts: &str, bid: f64) -> Tick {
        let ts = at(ts);
        Tick::new(
            id(symbol),
            Some(QuoteLevel { price: bid, amount: 1.0 }),
            Some(QuoteLevel { price: bid + 1.0, amount: 1.0 }),
            ts,
            None,
            ts,
        )
    }

    fn sampler(store: Arc<MemoryStore>, dir: &Path, config: SamplerConfig) -> MinuteSampler {
        MinuteSampler::new(
            store,
            Arc::new(Monitor::new(std::time::Duration::from_secs(3600))),
            config,
            "binance",
            "quote",
            dir,
        )
    }

    fn clock_config() -> SamplerConfig {
        SamplerConfig {
            trigger: SamplingTrigger::Clock,
            ..Default::default()
        }
    }

    fn disk_lines(path: &Path) -> Vec<TickRecord> {
        match fs::read_to_string(path) {
            Ok(content) => content.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_selects_last_tick_strictly_before_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut rx = store.subscribe();
        let s = sampler(store.clone(), dir.path(), clock_config());

        s.add_to_buffer(&tick("btc", "2024-01-01T10:00:30.000Z", 99.0)).await.unwrap();
        s.add_to_buffer(&tick("btc", "2024-01-01T10:00:59.500Z", 100.0)).await.unwrap();
        s.add_to_buffer(&tick("btc", "2024-01-01T10:01:00.200Z", 105.0)).await.unwrap();

        let minute = at("2024-01-01T10:01:00Z");
        let report = s.create_samples_for_minute(minute).await.unwrap();
        assert_eq!(report.sampled, 1);
        assert_eq!(report.skipped, 0);

        let latest = s.latest_sample(&id("btc")).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, at("2024-01-01T10:00:59.500Z"));
        assert_eq!(latest.bid_price, Some(100.0));
        assert_eq!(latest.sampling_timestamp, minute);
        let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&latest).unwrap()).unwrap();
        assert_eq!(json["sampling_timestamp"], "2024-01-01T10:01:00.000Z");

        assert_eq!(s.sample_window(&id("btc")).await.unwrap(), vec![latest.clone()]);
        let on_disk = disk_lines(&s.sample_path(&id("btc"), minute));
        assert_eq!(on_disk, vec![latest.clone()]);
        assert!(s
            .sample_path(&id("btc"), minute)
            .ends_with("sampled/binance/quote/btc/2024-01-01_sampled.jsonl"));

        let mut channels = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        channels.sort_by(|a, b| a.channel.cmp(&b.channel));
        assert_eq!(channels[0].channel, "latest_samples:binance:quote");
        assert_eq!(channels[1].channel, "latest_samples:binance:quote:btc");
        let envelope: SampleEnvelope = serde_json::from_str(&channels[0].payload).unwrap();
        assert_eq!(envelope.data, latest);
    }

    #[tokio::test]
    async fn test_stale_and_missing_ticks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(
            store.clone(),
            dir.path(),
            SamplerConfig {
                max_tick_age_secs: 30,
                ..clock_config()
            },
        );

        // 45s before the boundary: stale
        s.add_to_buffer(&tick("btc", "2024-01-01T10:00:15Z", 1.0)).await.unwrap();
        // only in the boundary minute itself: nothing before it
        s.add_to_buffer(&tick("eth", "2024-01-01T10:01:05Z", 1.0)).await.unwrap();

        let minute = at("2024-01-01T10:01:00Z");
        assert!(matches!(
            s.last_tick_before_minute(&id("btc"), minute).await.unwrap(),
            Selection::Skipped(SkipReason::Stale { .. })
        ));

        let report = s.create_samples_for_minute(minute).await.unwrap();
        assert_eq!(report.sampled, 0);
        assert_eq!(report.skipped, 2);
        assert!(s.latest_sample(&id("btc")).await.unwrap().is_none());
        assert!(s.latest_sample(&id("eth")).await.unwrap().is_none());

        let snap = s.monitor.snapshot();
        assert_eq!(snap.skipped_minutes, 2);
        assert_eq!(snap.samples_created, 0);
    }

    #[tokio::test]
    async fn test_tick_after_boundary_in_previous_bucket_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(store.clone(), dir.path(), clock_config());

        // a record that landed in the wrong bucket
        let record = tick("btc", "2024-01-01T10:01:05Z", 1.0).to_record();
        store
            .lpush(
                "crypto_ticks_sample:binance:quote:btc:2024-01-01:10:00",
                serde_json::to_string(&record).unwrap(),
            )
            .await
            .unwrap();

        let selection = s.last_tick_before_minute(&id("btc"), at("2024-01-01T10:01:00Z")).await.unwrap();
        assert_eq!(
            selection,
            Selection::Skipped(SkipReason::NotBeforeBoundary {
                tick_time: at("2024-01-01T10:01:05Z")
            })
        );
    }

    #[tokio::test]
    async fn test_resampling_a_minute_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(store.clone(), dir.path(), clock_config());
        s.add_to_buffer(&tick("btc", "2024-01-01T10:00:59.500Z", 100.0)).await.unwrap();

        let minute = at("2024-01-01T10:01:00Z");
        let first = s.create_samples_for_minute(minute).await.unwrap();
        let latest = s.latest_sample(&id("btc")).await.unwrap();
        let second = s.create_samples_for_minute(minute).await.unwrap();

        assert_eq!((first.sampled, first.resampled), (1, 0));
        assert_eq!((second.sampled, second.resampled), (0, 1));
        assert_eq!(s.latest_sample(&id("btc")).await.unwrap(), latest);
        assert_eq!(s.sample_window(&id("btc")).await.unwrap().len(), 1);
        assert_eq!(disk_lines(&s.sample_path(&id("btc"), minute)).len(), 1);
        assert_eq!(s.monitor.snapshot().samples_created, 1);
    }

    #[tokio::test]
    async fn test_window_keeps_most_recent_samples() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(
            store.clone(),
            dir.path(),
            SamplerConfig {
                samples_to_keep: 2,
                ..clock_config()
            },
        );

        for (ts, minute) in [
            ("2024-01-01T10:00:50Z", "2024-01-01T10:01:00Z"),
            ("2024-01-01T10:01:50Z", "2024-01-01T10:02:00Z"),
            ("2024-01-01T10:02:50Z", "2024-01-01T10:03:00Z"),
        ] {
            s.add_to_buffer(&tick("btc", ts, 1.0)).await.unwrap();
            s.create_samples_for_minute(at(minute)).await.unwrap();
        }

        let window = s.sample_window(&id("btc")).await.unwrap();
        let minutes: Vec<DateTime<Utc>> = window.iter().map(|r| r.sampling_timestamp).collect();
        assert_eq!(minutes, vec![at("2024-01-01T10:02:00Z"), at("2024-01-01T10:03:00Z")]);
        assert_eq!(disk_lines(&s.sample_path(&id("btc"), at("2024-01-01T10:03:00Z"))).len(), 3);
    }

    #[tokio::test]
    async fn test_unbounded_window_keeps_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(
            store.clone(),
            dir.path(),
            SamplerConfig {
                samples_to_keep: usize::MAX,
                max_len: usize::MAX,
                ..clock_config()
            },
        );

        for (ts, minute) in [
            ("2024-01-01T10:00:50Z", "2024-01-01T10:01:00Z"),
            ("2024-01-01T10:01:50Z", "2024-01-01T10:02:00Z"),
            ("2024-01-01T10:02:50Z", "2024-01-01T10:03:00Z"),
        ] {
            s.add_to_buffer(&tick("btc", ts, 1.0)).await.unwrap();
            s.create_samples_for_minute(at(minute)).await.unwrap();
        }

        assert_eq!(s.sample_window(&id("btc")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_one_failing_instrument_does_not_abort_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(store.clone(), dir.path(), clock_config());

        s.add_to_buffer(&tick("btc", "2024-01-01T10:00:40Z", 1.0)).await.unwrap();
        s.add_to_buffer(&tick("eth", "2024-01-01T10:00:40Z", 2.0)).await.unwrap();
        store
            .lpush("crypto_ticks_sample:binance:quote:btc:2024-01-01:10:00", "{broken".into())
            .await
            .unwrap();

        let report = s.create_samples_for_minute(at("2024-01-01T10:01:00Z")).await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.sampled, 1);
        assert!(s.latest_sample(&id("eth")).await.unwrap().is_some());
        assert_eq!(s.monitor.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn test_tick_trigger_samples_on_minute_rollover() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(
            store.clone(),
            dir.path(),
            SamplerConfig {
                trigger: SamplingTrigger::Tick,
                ..Default::default()
            },
        );

        // first tick claims its own minute
        let first = s.add_to_buffer(&tick("btc", "2024-01-01T10:00:30Z", 1.0)).await.unwrap();
        assert_eq!(first.map(|r| r.minute), Some(at("2024-01-01T10:00:00Z")));
        assert!(s.add_to_buffer(&tick("btc", "2024-01-01T10:00:50Z", 2.0)).await.unwrap().is_none());

        let rollover = s
            .add_to_buffer(&tick("btc", "2024-01-01T10:01:05Z", 3.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollover.minute, at("2024-01-01T10:01:00Z"));
        assert_eq!(rollover.sampled, 1);
        assert_eq!(s.last_sampled_minute(), Some(at("2024-01-01T10:01:00Z")));

        let latest = s.latest_sample(&id("btc")).await.unwrap().unwrap();
        assert_eq!(latest.bid_price, Some(2.0));

        // a late tick from an earlier minute never re-triggers
        assert!(s.add_to_buffer(&tick("btc", "2024-01-01T10:00:55Z", 4.0)).await.unwrap().is_none());
    }

    #[test]
    fn test_claim_minute_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let s = sampler(Arc::new(MemoryStore::new()), dir.path(), clock_config());
        assert_eq!(s.last_sampled_minute(), None);

        assert!(s.claim_minute(at("2024-01-01T10:01:00Z")));
        assert!(!s.claim_minute(at("2024-01-01T10:01:00Z")));
        assert!(!s.claim_minute(at("2024-01-01T10:00:00Z")));
        assert_eq!(s.sample_due(at("2024-01-01T10:01:40Z")), None);
        assert_eq!(s.sample_due(at("2024-01-01T10:02:02Z")), Some(at("2024-01-01T10:02:00Z")));
        assert_eq!(s.monitor.snapshot().missed_minutes, 0);

        // an overrun that jumps to 10:05 leaves 10:03 and 10:04 unsampled
        assert_eq!(s.sample_due(at("2024-01-01T10:05:01Z")), Some(at("2024-01-01T10:05:00Z")));
        assert_eq!(s.monitor.snapshot().missed_minutes, 2);
        assert_eq!(s.last_sampled_minute(), Some(at("2024-01-01T10:02:00Z")));
    }

    #[tokio::test]
    async fn test_minute_bucket_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let s = sampler(
            store.clone(),
            dir.path(),
            SamplerConfig {
                max_len: 3,
                ..clock_config()
            },
        );
        for i in 0..10 {
            let ts = format!("2024-01-01T10:00:{:02}Z", i);
            s.add_to_buffer(&tick("btc", &ts, i as f64)).await.unwrap();
        }
        let key = "crypto_ticks_sample:binance:quote:btc:2024-01-01:10:00";
        assert_eq!(store.lrange(key, 0, -1).await.unwrap().len(), 3);
        assert!(store.ttl(key).unwrap() <= std::time::Duration::from_secs(300));

        let head: TickRecord = serde_json::from_str(&store.lindex(key, 0).await.unwrap().unwrap()).unwrap();
        assert_eq!(head.bid_price, Some(9.0));
    }
}
