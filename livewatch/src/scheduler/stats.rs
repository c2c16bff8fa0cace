//! Scheduler counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters updated by probe workers.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    probes_started: AtomicU64,
    probes_completed: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    resolutions: AtomicU64,
    rate_limited: AtomicU64,
    in_flight: AtomicUsize,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatsSnapshot {
    pub probes_started: u64,
    pub probes_completed: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub resolutions: u64,
    pub rate_limited: u64,
    pub in_flight: usize,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a started check; the returned guard tracks it as in flight.
    pub fn start_probe(&self) -> InFlightGuard<'_> {
        self.probes_started.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { stats: self }
    }

    pub fn record_completed(&self) {
        self.probes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution(&self) {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            probes_started: self.probes_started.load(Ordering::Relaxed),
            probes_completed: self.probes_completed.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            resolutions: self.resolutions.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

/// Decrements the in-flight count on drop, including when a check is aborted.
pub struct InFlightGuard<'a> {
    stats: &'a SchedulerStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
