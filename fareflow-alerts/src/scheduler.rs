//! The two monitor cadences, each behind its own in-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::monitor::{AlertMonitor, SweepReport};
use crate::special::{SpecialOfferReport, SpecialOfferScanner};
use crate::MonitorResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome<T> {
    Completed(T),
    /// The previous run of this cadence was still in flight.
    Skipped,
}

/// Single in-flight flag. Acquiring never waits.
#[derive(Debug, Default)]
pub struct SweepGuard {
    running: AtomicBool,
}

/// Releases its guard on drop, including on panic.
pub struct SweepPermit<'a> {
    guard: &'a SweepGuard,
}

impl Drop for SweepPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

impl SweepGuard {
    pub fn try_acquire(&self) -> Option<SweepPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SweepPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

pub struct Scheduler {
    monitor: Arc<AlertMonitor>,
    scanner: Arc<SpecialOfferScanner>,
    alert_interval: Duration,
    special_interval: Duration,
    alert_guard: SweepGuard,
    special_guard: SweepGuard,
}

impl Scheduler {
    pub fn new(
        monitor: Arc<AlertMonitor>,
        scanner: Arc<SpecialOfferScanner>,
        alert_interval: Duration,
        special_interval: Duration,
    ) -> Self {
        Self {
            monitor,
            scanner,
            alert_interval,
            special_interval,
            alert_guard: SweepGuard::default(),
            special_guard: SweepGuard::default(),
        }
    }

    pub async fn run_alert_sweep(&self) -> MonitorResult<SweepOutcome<SweepReport>> {
        let Some(_permit) = self.alert_guard.try_acquire() else {
            warn!("Alert sweep still running, skipping this tick");
            return Ok(SweepOutcome::Skipped);
        };
        Ok(SweepOutcome::Completed(self.monitor.run_sweep().await?))
    }

    pub async fn run_special_sweep(&self) -> MonitorResult<SweepOutcome<SpecialOfferReport>> {
        let Some(_permit) = self.special_guard.try_acquire() else {
            warn!("Special offer sweep still running, skipping this tick");
            return Ok(SweepOutcome::Skipped);
        };
        Ok(SweepOutcome::Completed(self.scanner.scan().await?))
    }

    /// Starts both cadences. Each tick runs on its own task so a slow sweep
    /// does not delay the clock; overlapping ticks hit the guard and skip.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            "Scheduler started: alert sweep every {:?}, special offers every {:?}",
            self.alert_interval, self.special_interval
        );

        let alerts = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(scheduler.alert_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.run_alert_sweep().await {
                            error!("Alert sweep failed: {}", e);
                        }
                    });
                }
            })
        };

        let specials = {
            let scheduler = self;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(scheduler.special_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let scheduler = scheduler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.run_special_sweep().await {
                            error!("Special offer sweep failed: {}", e);
                        }
                    });
                }
            })
        };

        vec![alerts, specials]
    }
}
