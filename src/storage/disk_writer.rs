use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::core::error::WriterError;
use crate::engine::stop::StopSignal;
use crate::memory::keys::TickBucketKey;
use crate::memory::tick_cache::FlushSource;
use crate::monitor::Monitor;
use crate::storage::jsonl;

/// Outcome of one flush pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub keys_seen: usize,
    pub keys_written: usize,
    pub ticks_written: usize,
    pub failed_keys: usize,
}

/// Drains tick buckets of one instrument class into per-day files.
///
/// Layout: `<base_dir>/<exchange>/<data_type>/<symbol>/<YYYY-MM-DD>.jsonl`.
pub struct DiskWriter {
    base_dir: PathBuf,
    exchange: String,
    data_type: String,
    flush_interval: Duration,
    monitor: Arc<Monitor>,
}

impl DiskWriter {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        exchange: impl Into<String>,
        data_type: impl Into<String>,
        flush_interval: Duration,
        monitor: Arc<Monitor>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            exchange: exchange.into(),
            data_type: data_type.into(),
            flush_interval,
            monitor,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves a tick bucket key to its day file
    pub fn path_for_key(&self, key: &str) -> Result<PathBuf, WriterError> {
        let parsed = TickBucketKey::parse(key).ok_or_else(|| WriterError::InvalidKey(key.to_string()))?;
        Ok(self
            .base_dir
            .join(&parsed.instrument.exchange)
            .join(&parsed.instrument.data_type)
            .join(&parsed.instrument.symbol)
            .join(format!("{}.jsonl", parsed.date)))
    }

    /// One pass over every flushable bucket, oldest first.
    ///
    /// A bucket that fails to write is logged and counted; its ticks are
    /// already taken and are not retried.
    pub async fn flush_to_disk(&self, cache: &dyn FlushSource) -> Result<FlushReport, WriterError> {
        let _timer = self.monitor.time("flush_to_disk");
        let keys = cache.get_keys_to_flush(&self.exchange, &self.data_type).await?;
        let mut report = FlushReport {
            keys_seen: keys.len(),
            ..Default::default()
        };

        for key in keys {
            match self.flush_key(cache, &key).await {
                Ok(0) => {}
                Ok(n) => {
                    report.keys_written += 1;
                    report.ticks_written += n;
                }
                Err(e) => {
                    report.failed_keys += 1;
                    self.monitor.track_error("flush", None, &format!("{}: {}", key, e));
                }
            }
        }

        if report.ticks_written > 0 || report.failed_keys > 0 {
            info!(
                keys = report.keys_written,
                ticks = report.ticks_written,
                failed = report.failed_keys,
                "Flushed ticks to disk"
            );
        }
        Ok(report)
    }

    async fn flush_key(&self, cache: &dyn FlushSource, key: &str) -> Result<usize, WriterError> {
        // resolve first so an unparseable key is never drained
        let path = self.path_for_key(key)?;
        let ticks = cache.get_and_clear_ticks(key).await?;
        if ticks.is_empty() {
            return Ok(0);
        }

        let count = ticks.len();
        debug!(count, path = %path.display(), "Writing ticks");
        jsonl::append_records_blocking(path, ticks).await?;
        Ok(count)
    }

    /// Flushes every interval until stopped, then once more.
    ///
    /// Errors from one pass are logged; the next pass retries.
    pub async fn start_flush_loop(self: Arc<Self>, cache: Arc<dyn FlushSource>, stop: StopSignal) {
        info!(
            exchange = %self.exchange,
            data_type = %self.data_type,
            interval_secs = self.flush_interval.as_secs(),
            "Flush loop started"
        );

        while stop.is_running() {
            self.flush_logged(cache.as_ref()).await;
            if !stop.sleep(self.flush_interval).await {
                break;
            }
        }

        self.flush_logged(cache.as_ref()).await;
        info!("Flush loop stopped");
    }

    async fn flush_logged(&self, cache: &dyn FlushSource) {
        if let Err(e) = self.flush_to_disk(cache).await {
            error!("Error flushing to disk: {}", e);
            self.monitor.track_error("flush_pass", None, &e.to_string());
        }
    }
}
