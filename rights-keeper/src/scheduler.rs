//! Upkeep scheduler
//!
//! Time-triggered driver of the two-phase sweep: every tick it asks the
//! registry whether upkeep is due and only then performs it. There is no
//! relationship between the tick period and license periods; a license may
//! stay listed (while already reporting invalid) until the next tick.

use crate::Result;
use rights_core::{Error as RegistryError, RegistryHandle};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of one scheduler tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpkeepEvent {
    /// Check reported nothing due
    NothingDue,

    /// Sweep ran
    Performed {
        /// Licenses removed
        removed: usize,
        /// Certificates that lost a license
        certificates: usize,
    },

    /// Check said due but another caller swept first
    AlreadySwept,

    /// Tick failed
    Failed {
        /// Error description
        reason: String,
    },
}

/// Running totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Ticks executed
    pub ticks: u64,

    /// Sweeps performed
    pub sweeps: u64,

    /// Licenses removed across all sweeps
    pub licenses_removed: u64,

    /// Ticks that failed
    pub failures: u64,
}

/// Periodic upkeep driver
pub struct UpkeepScheduler {
    handle: RegistryHandle,
    interval: Duration,
    check_on_start: bool,
    stats: Arc<RwLock<SchedulerStats>>,
    last_event: Arc<RwLock<Option<UpkeepEvent>>>,
}

impl std::fmt::Debug for UpkeepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpkeepScheduler")
            .field("interval", &self.interval)
            .field("check_on_start", &self.check_on_start)
            .finish()
    }
}

impl UpkeepScheduler {
    /// Create new scheduler
    pub fn new(handle: RegistryHandle, interval: Duration) -> Self {
        Self {
            handle,
            interval,
            check_on_start: true,
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            last_event: Arc::new(RwLock::new(None)),
        }
    }

    /// Build from keeper configuration
    pub fn from_config(handle: RegistryHandle, config: &crate::Config) -> Self {
        let mut scheduler = Self::new(handle, Duration::from_secs(config.interval_secs));
        scheduler.check_on_start = config.check_on_start;
        scheduler
    }

    /// Start scheduler loop; returns once `shutdown` flips to true or its sender drops
    pub async fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting upkeep scheduler");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !self.check_on_start {
            // First tick of a tokio interval completes immediately
            interval.tick().await;
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "Upkeep tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Upkeep scheduler stopped");
    }

    /// One check/perform cycle
    pub async fn run_once(&self) -> Result<UpkeepEvent> {
        let outcome = self.tick().await;

        let event = match &outcome {
            Ok(event) => event.clone(),
            Err(e) => UpkeepEvent::Failed {
                reason: e.to_string(),
            },
        };
        self.record(&event).await;

        outcome
    }

    async fn tick(&self) -> Result<UpkeepEvent> {
        if !self.handle.check_upkeep().await? {
            debug!("No expired licenses");
            return Ok(UpkeepEvent::NothingDue);
        }

        match self.handle.perform_upkeep().await {
            Ok(report) => {
                info!(
                    removed = report.licenses_removed(),
                    certificates = report.certificates_touched.len(),
                    "Expired licenses swept"
                );
                Ok(UpkeepEvent::Performed {
                    removed: report.licenses_removed(),
                    certificates: report.certificates_touched.len(),
                })
            }
            Err(RegistryError::UpkeepNotNeeded) => {
                debug!("Upkeep already performed by another caller");
                Ok(UpkeepEvent::AlreadySwept)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record(&self, event: &UpkeepEvent) {
        let mut stats = self.stats.write().await;
        stats.ticks += 1;
        match event {
            UpkeepEvent::Performed { removed, .. } => {
                stats.sweeps += 1;
                stats.licenses_removed += *removed as u64;
            }
            UpkeepEvent::Failed { .. } => stats.failures += 1,
            UpkeepEvent::NothingDue | UpkeepEvent::AlreadySwept => {}
        }
        drop(stats);

        *self.last_event.write().await = Some(event.clone());
    }

    /// Totals so far
    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    /// Most recent tick outcome
    pub async fn last_event(&self) -> Option<UpkeepEvent> {
        self.last_event.read().await.clone()
    }
}
