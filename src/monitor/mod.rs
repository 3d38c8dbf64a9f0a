pub mod health;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::core::types::InstrumentId;

pub use health::{run_health_checks, HealthReport};

/// Counters for one instrument
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentStats {
    pub ticks_received: u64,
    pub samples_created: u64,
    pub last_tick_time: Option<DateTime<Utc>>,
    pub last_sample_time: Option<DateTime<Utc>>,
    pub errors: u64,
    pub skipped_samples: u64,
}

/// Point-in-time copy of the global counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSnapshot {
    pub processed_ticks: u64,
    pub sampled_minutes: u64,
    pub samples_created: u64,
    pub errors: u64,
    pub skipped_minutes: u64,
    pub out_of_order_ticks: u64,
    pub dropped_messages: u64,
    /// Minute boundaries the clock jumped over without a sampling pass
    pub missed_minutes: u64,
}

/// Observability sink shared by the cache, sampler, writer and driver.
///
/// Recording never fails and never blocks on I/O; counters are mirrored to
/// the `metrics` facade so an installed exporter can scrape them.
#[derive(Debug)]
pub struct Monitor {
    instruments: DashMap<InstrumentId, InstrumentStats>,
    processed_ticks: AtomicU64,
    samples_created: AtomicU64,
    errors: AtomicU64,
    skipped_minutes: AtomicU64,
    out_of_order_ticks: AtomicU64,
    dropped_messages: AtomicU64,
    missed_minutes: AtomicU64,
    // distinct minutes: sampling minutes only move forward, so counting
    // advances of the high-water mark counts distinct minutes
    sampled_minutes: AtomicU64,
    last_sampled_minute: AtomicI64,
    stats_interval: Duration,
    last_report: Mutex<Instant>,
}

impl Monitor {
    pub fn new(stats_interval: Duration) -> Self {
        Self {
            instruments: DashMap::new(),
            processed_ticks: AtomicU64::new(0),
            samples_created: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            skipped_minutes: AtomicU64::new(0),
            out_of_order_ticks: AtomicU64::new(0),
            dropped_messages: AtomicU64::new(0),
            missed_minutes: AtomicU64::new(0),
            sampled_minutes: AtomicU64::new(0),
            last_sampled_minute: AtomicI64::new(i64::MIN),
            stats_interval,
            last_report: Mutex::new(Instant::now()),
        }
    }

    pub fn track_tick(&self, instrument: &InstrumentId, event_time: DateTime<Utc>) {
        self.processed_ticks.fetch_add(1, Ordering::Relaxed);
        {
            let mut stats = self.instruments.entry(instrument.clone()).or_default();
            stats.ticks_received += 1;
            stats.last_tick_time = Some(event_time);
        }
        metrics::increment_counter!("tick_recorder_ticks_total", "symbol" => instrument.symbol.clone());
        self.maybe_report();
    }

    pub fn track_sample(&self, instrument: &InstrumentId, minute: DateTime<Utc>) {
        self.samples_created.fetch_add(1, Ordering::Relaxed);
        let m = minute.timestamp();
        if self.last_sampled_minute.fetch_max(m, Ordering::AcqRel) < m {
            self.sampled_minutes.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(mut stats) = self.instruments.get_mut(instrument) {
            stats.samples_created += 1;
            stats.last_sample_time = Some(minute);
        }
        metrics::increment_counter!("tick_recorder_samples_total", "symbol" => instrument.symbol.clone());
    }

    pub fn track_skipped_minute(&self, instrument: &InstrumentId, minute: DateTime<Utc>, reason: &str) {
        self.skipped_minutes.fetch_add(1, Ordering::Relaxed);
        if let Some(mut stats) = self.instruments.get_mut(instrument) {
            stats.skipped_samples += 1;
        }
        metrics::increment_counter!("tick_recorder_skipped_minutes_total");
        warn!(instrument = %instrument, minute = %minute, reason, "Skipped sample");
    }

    /// Records an error. `instrument` is `None` for failures not tied to one stream.
    pub fn track_error(&self, kind: &str, instrument: Option<&InstrumentId>, details: &str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if let Some(id) = instrument {
            if let Some(mut stats) = self.instruments.get_mut(id) {
                stats.errors += 1;
            }
        }
        metrics::increment_counter!("tick_recorder_errors_total", "kind" => kind.to_string());
        match instrument {
            Some(id) => error!(kind, instrument = %id, "{}", details),
            None => error!(kind, "{}", details),
        }
    }

    pub fn track_out_of_order(&self) {
        self.out_of_order_ticks.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("tick_recorder_out_of_order_total");
    }

    /// A feed message that never became a tick
    pub fn track_dropped_message(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        metrics::increment_counter!("tick_recorder_dropped_messages_total");
    }

    /// `count` consecutive boundaries from `first` got no sampling pass
    pub fn track_missed_minutes(&self, first: DateTime<Utc>, count: u64) {
        self.missed_minutes.fetch_add(count, Ordering::Relaxed);
        metrics::counter!("tick_recorder_missed_minutes_total", count);
        warn!(first = %first, count, "Minute boundaries missed");
    }

    /// Starts a timer that logs the operation's duration when dropped
    pub fn time(&self, operation: &'static str) -> TimingGuard {
        TimingGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub fn instrument_stats(&self, instrument: &InstrumentId) -> Option<InstrumentStats> {
        self.instruments.get(instrument).map(|s| s.clone())
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            processed_ticks: self.processed_ticks.load(Ordering::Relaxed),
            sampled_minutes: self.sampled_minutes.load(Ordering::Relaxed),
            samples_created: self.samples_created.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            skipped_minutes: self.skipped_minutes.load(Ordering::Relaxed),
            out_of_order_ticks: self.out_of_order_ticks.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            missed_minutes: self.missed_minutes.load(Ordering::Relaxed),
        }
    }

    /// Logs the summary if the stats interval has elapsed since the last one
    pub fn maybe_report(&self) {
        {
            let mut last = self.last_report.lock();
            if last.elapsed() < self.stats_interval {
                return;
            }
            *last = Instant::now();
        }
        self.report();
    }

    pub fn report(&self) {
        let snap = self.snapshot();
        info!(
            total_ticks = snap.processed_ticks,
            sampled_minutes = snap.sampled_minutes,
            samples = snap.samples_created,
            errors = snap.errors,
            skipped_minutes = snap.skipped_minutes,
            out_of_order = snap.out_of_order_ticks,
            dropped = snap.dropped_messages,
            missed_minutes = snap.missed_minutes,
            "Sampling statistics"
        );
        for entry in self.instruments.iter() {
            let s = entry.value();
            info!(
                instrument = %entry.key(),
                ticks = s.ticks_received,
                samples = s.samples_created,
                errors = s.errors,
                skipped = s.skipped_samples,
                last_tick = ?s.last_tick_time,
                last_sample = ?s.last_sample_time,
                "Instrument statistics"
            );
        }
    }
}

/// Logs how long an operation took when it goes out of scope
#[must_use = "the timer stops as soon as the guard is dropped"]
pub struct TimingGuard {
    operation: &'static str,
    start: Instant,
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        metrics::histogram!(
            "tick_recorder_operation_seconds",
            elapsed.as_secs_f64(),
            "operation" => self.operation
        );
        debug!(operation = self.operation, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "Operation timing");
    }
}
