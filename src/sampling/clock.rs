use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::sampler::MinuteSampler;
use crate::core::time::floor_minute;
use crate::engine::stop::StopSignal;

/// Time from `now` until `grace` past the next minute boundary.
///
/// If `now` is still inside the grace period of the boundary just passed,
/// that boundary is the target.
pub fn delay_until_next_minute(now: DateTime<Utc>, grace: Duration) -> Duration {
    let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
    let mut target = floor_minute(now) + grace;
    if target <= now {
        target += chrono::Duration::minutes(1);
    }
    (target - now).to_std().unwrap_or_default()
}

/// Where the minute clock reads the current time
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Samples every minute boundary on the wall clock until stopped.
///
/// Fires `grace` after each boundary so late ticks of the previous minute
/// are buffered first.
pub async fn run_minute_clock(sampler: Arc<MinuteSampler>, grace: Duration, stop: StopSignal) {
    run_minute_clock_with(sampler, grace, stop, WallClock).await
}

/// [`run_minute_clock`] reading time from `time`.
///
/// A pass that overruns the next boundary makes the following claim skip
/// ahead; the sampler records the boundaries in between as missed.
pub async fn run_minute_clock_with<T: TimeSource>(
    sampler: Arc<MinuteSampler>,
    grace: Duration,
    stop: StopSignal,
    time: T,
) {
    info!(grace_ms = grace.as_millis() as u64, "Minute clock started");

    while stop.is_running() {
        let delay = delay_until_next_minute(time.now(), grace);
        if !stop.sleep(delay).await {
            break;
        }
        let Some(minute) = sampler.sample_due(time.now()) else {
            continue;
        };
        if let Err(e) = sampler.create_samples_for_minute(minute).await {
            warn!(minute = %minute, "Sampling pass aborted: {}", e);
        }
    }

    info!("Minute clock stopped");
}
