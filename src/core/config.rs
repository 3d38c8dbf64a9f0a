use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::ConfigError;
use crate::utils::parse_topic;

/// Which shared store backs the tick and sample buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// What decides that a minute boundary has been crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingTrigger {
    /// A tick whose event minute is newer than the last sampled minute
    Tick,
    /// A wall-clock timer firing shortly after every minute boundary
    Clock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            url: "redis://localhost:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickCacheConfig {
    /// Maximum entries per hour bucket; 0 keeps everything until flushed
    pub max_len: usize,
    pub expiry_secs: u64,
}

impl Default for TickCacheConfig {
    fn default() -> Self {
        Self {
            max_len: 0,
            expiry_secs: 86_400,
        }
    }
}

impl TickCacheConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Entries retained per minute bucket
    pub max_len: usize,
    pub expiry_secs: u64,
    /// Oldest tick age, relative to the boundary, still eligible for a sample
    pub max_tick_age_secs: u64,
    /// Length of the rolling sample window per instrument
    pub samples_to_keep: usize,
    pub trigger: SamplingTrigger,
    /// Delay after a boundary before the clock trigger samples it
    pub grace_millis: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_len: 1000,
            expiry_secs: 300,
            max_tick_age_secs: 60,
            samples_to_keep: 1440,
            trigger: SamplingTrigger::Clock,
            grace_millis: 2000,
        }
    }
}

impl SamplerConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    pub fn max_tick_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_tick_age_secs as i64)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiskWriterConfig {
    pub flush_interval_secs: u64,
}

impl Default for DiskWriterConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 60,
        }
    }
}

impl DiskWriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Root of the raw tick files
    pub tick_dir: PathBuf,
    /// Root of the sample files; samples land under `<sample_dir>/sampled/`
    pub sample_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            tick_dir: PathBuf::from("data/ticks"),
            sample_dir: PathBuf::from("data/samples"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub stats_interval_secs: u64,
    pub health_check_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: 60,
            health_check_interval_secs: 300,
        }
    }
}

impl MonitorConfig {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

/// Top-level recorder configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Feed topic, `crypto-ticks-<exchange>-<data_type>`
    pub topic: String,
    pub store: StoreConfig,
    pub tick_cache: TickCacheConfig,
    pub sampler: SamplerConfig,
    pub disk_writer: DiskWriterConfig,
    pub recording: RecordingConfig,
    pub monitor: MonitorConfig,
    /// Prometheus exporter listen address
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            topic: "crypto-ticks-binance-futures-quote".to_string(),
            store: StoreConfig::default(),
            tick_cache: TickCacheConfig::default(),
            sampler: SamplerConfig::default(),
            disk_writer: DiskWriterConfig::default(),
            recording: RecordingConfig::default(),
            monitor: MonitorConfig::default(),
            metrics_listen: None,
        }
    }
}

impl RecorderConfig {
    /// Loads and validates a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `(exchange, data_type)` of the configured topic
    pub fn instrument_class(&self) -> Result<(String, String), ConfigError> {
        parse_topic(&self.topic)
            .ok_or_else(|| ConfigError::Invalid(format!("unrecognised topic {:?}", self.topic)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.instrument_class()?;
        let checks = [
            (self.disk_writer.flush_interval_secs == 0, "disk_writer.flush_interval_secs must be > 0"),
            (self.sampler.samples_to_keep == 0, "sampler.samples_to_keep must be > 0"),
            (self.sampler.max_len == 0, "sampler.max_len must be > 0"),
            (self.sampler.expiry_secs == 0, "sampler.expiry_secs must be > 0"),
            (self.tick_cache.expiry_secs == 0, "tick_cache.expiry_secs must be > 0"),
            (self.monitor.health_check_interval_secs == 0, "monitor.health_check_interval_secs must be > 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(ConfigError::Invalid((*msg).to_string())),
            None => Ok(()),
        }
    }
}
