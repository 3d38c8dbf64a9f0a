use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// Shared running flag for the pipeline's loops.
///
/// Loops check [`StopSignal::is_running`] at the top of each iteration and
/// sleep through [`StopSignal::sleep`], which returns early once stopped.
#[derive(Debug, Clone)]
pub struct StopSignal {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Sleeps for `duration` or until stopped. Returns whether still running.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // register before checking the flag so a concurrent stop is not missed
        notified.as_mut().enable();
        if !self.is_running() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
        self.is_running()
    }
}
