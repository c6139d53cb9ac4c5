use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum gap between outbound calls to one source.
/// Early callers are delayed until their slot, never dropped.
pub struct RequestSpacer {
    min_interval: Duration,
    last_issued: Mutex<Option<Instant>>,
}

impl RequestSpacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_issued: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until this caller may issue its request. The lock is held across
    /// the sleep so concurrent callers queue up one interval apart.
    pub async fn wait_turn(&self) {
        let mut last = self.last_issued.lock().await;
        if let Some(previous) = *last {
            let next_slot = previous + self.min_interval;
            if Instant::now() < next_slot {
                sleep_until(next_slot).await;
            }
        }
        *last = Some(Instant::now());
    }
}
