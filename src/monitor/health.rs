use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::Monitor;
use crate::core::error::StoreError;
use crate::engine::stop::StopSignal;
use crate::memory::keys::{MINUTE_PREFIX, SAMPLE_PREFIX, TICK_PREFIX};
use crate::store::{KeyValueStore, StoreInfo};

/// Result of one store health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub info: StoreInfo,
    pub tick_bucket_keys: usize,
    pub minute_bucket_keys: usize,
    pub sampled_keys: usize,
}

impl Monitor {
    /// Probes the shared store and logs memory, clients and key counts.
    /// Failures are logged and reported as `None`; they never propagate.
    pub async fn check_health(&self, store: &dyn KeyValueStore) -> Option<HealthReport> {
        match probe(store).await {
            Ok(report) => {
                info!(
                    memory = %report.info.used_memory_human,
                    peak_memory = %report.info.used_memory_peak_human,
                    clients = report.info.connected_clients,
                    tick_bucket_keys = report.tick_bucket_keys,
                    minute_bucket_keys = report.minute_bucket_keys,
                    sampled_keys = report.sampled_keys,
                    "Store health"
                );
                metrics::gauge!("tick_recorder_store_tick_buckets", report.tick_bucket_keys as f64);
                metrics::gauge!("tick_recorder_store_minute_buckets", report.minute_bucket_keys as f64);
                Some(report)
            }
            Err(e) => {
                error!("Store health check failed: {}", e);
                None
            }
        }
    }
}

/// Probes the store every `interval` until stopped
pub async fn run_health_checks(
    monitor: Arc<Monitor>,
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
    stop: StopSignal,
) {
    while stop.is_running() {
        if !stop.sleep(interval).await {
            break;
        }
        monitor.check_health(store.as_ref()).await;
    }
}

async fn probe(store: &dyn KeyValueStore) -> Result<HealthReport, StoreError> {
    let info = store.info().await?;
    let tick_bucket_keys = store.keys(&format!("{}:*", TICK_PREFIX)).await?.len();
    let minute_bucket_keys = store.keys(&format!("{}:*", MINUTE_PREFIX)).await?.len();
    let sampled_keys = store.keys(&format!("{}:*", SAMPLE_PREFIX)).await?.len();
    Ok(HealthReport {
        info,
        tick_bucket_keys,
        minute_bucket_keys,
        sampled_keys,
    })
}
