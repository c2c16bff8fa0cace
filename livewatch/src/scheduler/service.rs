//! Health scheduler.
//!
//! A dispatcher pulls due units from the [`DueQueue`] and runs each check on a
//! bounded worker pool. A check holds the unit's probe gate, resolves when
//! needed, probes, and folds the report into the recovery controller under the
//! unit's record lock. The unit is then re-queued at its next due time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::DueQueue;
use super::stats::{SchedulerStats, SchedulerStatsSnapshot};
use crate::domain::{ProbeOutcome, ProbeResult, QualityTier, StreamHandle, Unit};
use crate::error::{RegistryError, ResolutionError};
use crate::prober::FrameProber;
use crate::recovery::{CheckReport, RecoveryController, Transition};
use crate::registry::{UnitEvent, UnitRegistry, UnitSlot};
use crate::resolver::Resolver;
use crate::{Error, Result};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrent checks.
    pub concurrency: usize,
    /// Per-check budget covering resolution and probing.
    pub probe_timeout_secs: u64,
    /// Wake-up interval when nothing is queued.
    pub idle_poll_ms: u64,
    /// Add up to 10% random spread to each interval.
    pub jitter: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            probe_timeout_secs: 60,
            idle_poll_ms: 1000,
            jitter: true,
        }
    }
}

impl SchedulerConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("scheduler.concurrency must be at least 1"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(Error::config("scheduler.probe_timeout_secs must be non-zero"));
        }
        Ok(())
    }
}

/// Everything a probe worker needs.
struct CheckContext {
    registry: Arc<UnitRegistry>,
    resolver: Arc<dyn Resolver>,
    prober: FrameProber,
    controller: RecoveryController,
    stats: SchedulerStats,
    config: SchedulerConfig,
    min_quality: QualityTier,
}

pub struct HealthScheduler {
    ctx: Arc<CheckContext>,
    queue: Arc<DueQueue>,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl HealthScheduler {
    pub fn new(
        registry: Arc<UnitRegistry>,
        resolver: Arc<dyn Resolver>,
        prober: FrameProber,
        controller: RecoveryController,
        config: SchedulerConfig,
        min_quality: QualityTier,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            ctx: Arc::new(CheckContext {
                registry,
                resolver,
                prober,
                controller,
                stats: SchedulerStats::new(),
                config,
                min_quality,
            }),
            queue: Arc::new(DueQueue::new()),
            cancellation_token,
            tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Queue every known unit and start the dispatcher and event listener.
    pub fn start(&self) {
        let events = self.ctx.registry.subscribe();
        let seeded = self.ctx.schedule_all(&self.queue);

        info!(
            "Starting health scheduler with {} workers, {} units queued",
            self.ctx.config.concurrency, seeded
        );

        let dispatcher = tokio::spawn(dispatch_loop(
            self.ctx.clone(),
            self.queue.clone(),
            self.cancellation_token.clone(),
        ));
        let listener = tokio::spawn(event_loop(
            self.ctx.clone(),
            self.queue.clone(),
            self.cancellation_token.clone(),
            events,
        ));

        let mut tasks = self.tasks.lock();
        tasks.push(dispatcher);
        tasks.push(listener);
    }

    /// Make a unit due immediately.
    pub fn trigger_probe(&self, id: &str) -> Result<()> {
        if !self.ctx.registry.contains(id) {
            return Err(RegistryError::NotFound(id.to_string()).into());
        }
        debug!(unit_id = %id, "Probe triggered");
        self.queue.schedule(id, Instant::now());
        Ok(())
    }

    /// Run one check of `id` right now, outside the pool.
    ///
    /// Still serialised with any queued check of the same unit.
    pub async fn check_now(&self, id: &str) -> Result<Transition> {
        let slot = self
            .ctx
            .registry
            .slot(id)
            .ok_or_else(|| Error::from(RegistryError::NotFound(id.to_string())))?;
        self.ctx.run_check(id, &slot).await
    }

    /// Next due time of a queued unit.
    pub fn due_at(&self, id: &str) -> Option<Instant> {
        self.queue.due_at(id)
    }

    pub fn stats(&self) -> SchedulerStatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Cancel and wait for in-flight checks to drain.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Scheduler task failed: {}", e);
            }
        }
        info!("Health scheduler stopped");
    }
}

impl CheckContext {
    fn schedule_all(&self, queue: &DueQueue) -> usize {
        let units = self.registry.snapshot();
        let count = units.len();
        for unit in units {
            queue.reschedule(&unit.id, self.initial_due(&unit));
        }
        count
    }

    /// First due time for a unit known before the scheduler started.
    fn initial_due(&self, unit: &Unit) -> Instant {
        let now = Instant::now();
        let Some(checked) = unit.last_checked_at else {
            return now;
        };
        let interval = self
            .controller
            .policy()
            .interval(unit.status, unit.backoff_level);
        let elapsed = (Utc::now() - checked).to_std().unwrap_or_default();
        let remaining = interval.saturating_sub(elapsed).max(cooldown_remaining(unit));
        now + remaining
    }

    /// Due time after a check that left the unit as `unit`.
    fn next_due(&self, unit: &Unit) -> Instant {
        let mut delay = self
            .controller
            .policy()
            .interval(unit.status, unit.backoff_level);
        if self.config.jitter {
            delay += delay.mul_f64(rand::random::<f64>() * 0.1);
        }
        Instant::now() + delay.max(cooldown_remaining(unit))
    }

    /// Check a unit and work out when it is due next. `None` if it was removed.
    async fn check_and_plan(&self, id: &str) -> Option<Instant> {
        let slot = self.registry.slot(id)?;
        match self.run_check(id, &slot).await {
            Ok(_) => self.registry.get(id).map(|unit| self.next_due(&unit)),
            Err(Error::Registry(RegistryError::NotFound(_))) => {
                debug!(unit_id = %id, "Unit removed during check");
                None
            }
            Err(e) => {
                error!(unit_id = %id, error = %e, "Check could not be applied");
                self.registry.get(id).map(|unit| self.next_due(&unit))
            }
        }
    }

    async fn run_check(&self, id: &str, slot: &UnitSlot) -> Result<Transition> {
        let _gate = slot.lock_probe().await;
        let unit = slot.snapshot();
        let _in_flight = self.stats.start_probe();

        let budget = self.config.probe_timeout();
        let report = match tokio::time::timeout(budget, self.perform_check(&unit)).await {
            Ok(report) => report,
            Err(_) => {
                warn!(unit_id = %id, timeout = ?budget, "Check exceeded its time budget");
                CheckReport::Probed {
                    result: ProbeResult::new(id, ProbeOutcome::Timeout, budget),
                    resolved: None,
                }
            }
        };

        let outcome = report.outcome();
        let latency_ms = match &report {
            CheckReport::Probed { result, .. } => result.latency.as_millis() as u64,
            CheckReport::ResolveFailed { .. } => 0,
        };
        let resolution_error = match &report {
            CheckReport::ResolveFailed { error, .. } => Some(error.to_string()),
            CheckReport::Probed { .. } => None,
        };
        match outcome {
            Some(ProbeOutcome::Ok) => {}
            Some(ProbeOutcome::Timeout) => {
                self.stats.record_timeout();
                self.stats.record_failure();
            }
            Some(_) => self.stats.record_failure(),
            None => {
                if !matches!(
                    report,
                    CheckReport::ResolveFailed {
                        error: ResolutionError::RateLimited(_),
                        ..
                    }
                ) {
                    self.stats.record_failure();
                }
            }
        }

        let (transition, updated) = self.registry.update_with(id, |record| {
            let transition = self.controller.apply(record, report)?;
            Ok((transition, record.clone()))
        })?;
        self.stats.record_completed();

        self.registry.publish(UnitEvent::Probed {
            unit_id: id.to_string(),
            status: transition.to,
            outcome,
            resolution_error,
            latency_ms,
            timestamp: Utc::now(),
        });
        if transition.status_changed() {
            self.registry.publish(UnitEvent::StatusChanged {
                unit_id: id.to_string(),
                display_name: updated.display_name.clone(),
                old_status: transition.from,
                new_status: transition.to,
                consecutive_failures: transition.consecutive_failures,
                backoff_level: transition.backoff_level,
                playback_url: updated.resolved_handle.as_ref().map(|h| h.playback_url.clone()),
                timestamp: Utc::now(),
            });
        }

        Ok(transition)
    }

    /// Resolve if needed, then probe. Never fails; failures become reports.
    async fn perform_check(&self, unit: &Unit) -> CheckReport {
        let mut resolved = None;
        let handle = match unit.resolved_handle.clone() {
            Some(handle) if !unit.needs_resolution() => handle,
            _ => {
                self.stats.record_resolution();
                match self.resolve(unit).await {
                    Ok(handle) => {
                        resolved = Some(handle.clone());
                        handle
                    }
                    Err(error) => {
                        if matches!(error, ResolutionError::RateLimited(_)) {
                            self.stats.record_rate_limited();
                        }
                        return CheckReport::ResolveFailed {
                            unit_id: unit.id.clone(),
                            timestamp: Utc::now(),
                            error,
                        };
                    }
                }
            }
        };

        let result = self.prober.probe(&unit.id, &handle).await;
        CheckReport::Probed { result, resolved }
    }

    async fn resolve(&self, unit: &Unit) -> std::result::Result<StreamHandle, ResolutionError> {
        let handle = self.resolver.resolve(&unit.source_query).await?;
        if handle.quality_tier.is_below(self.min_quality) {
            warn!(
                unit_id = %unit.id,
                tier = %handle.quality_tier,
                wanted = %self.min_quality,
                "Maximum quality unavailable, continuing with lower tier"
            );
        } else {
            debug!(unit_id = %unit.id, tier = %handle.quality_tier, "Resolved stream");
        }
        Ok(handle)
    }
}

fn cooldown_remaining(unit: &Unit) -> Duration {
    unit.cooldown_until
        .and_then(|until| (until - Utc::now()).to_std().ok())
        .unwrap_or_default()
}

async fn dispatch_loop(
    ctx: Arc<CheckContext>,
    queue: Arc<DueQueue>,
    cancellation_token: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(ctx.config.concurrency));
    let idle_poll = ctx.config.idle_poll();
    let mut workers: JoinSet<()> = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let id = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            id = queue.wait_due(idle_poll) => id,
        };

        let ctx = ctx.clone();
        let queue = queue.clone();
        let token = cancellation_token.clone();
        workers.spawn(async move {
            let _permit = permit;
            let next = tokio::select! {
                _ = token.cancelled() => {
                    debug!(unit_id = %id, "Check aborted by shutdown");
                    return;
                }
                next = ctx.check_and_plan(&id) => next,
            };
            if let Some(due) = next {
                queue.reschedule(&id, due);
            }
        });

        while let Some(joined) = workers.try_join_next() {
            if let Err(e) = joined {
                error!("Probe worker failed: {}", e);
            }
        }
    }

    debug!("Dispatcher draining {} workers", workers.len());
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!("Probe worker failed: {}", e);
        }
    }
}

async fn event_loop(
    ctx: Arc<CheckContext>,
    queue: Arc<DueQueue>,
    cancellation_token: CancellationToken,
    mut events: broadcast::Receiver<UnitEvent>,
) {
    loop {
        let event = tokio::select! {
            _ = cancellation_token.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(UnitEvent::Added { unit_id, .. }) => queue.schedule(&unit_id, Instant::now()),
            Ok(UnitEvent::Removed { unit_id, .. }) => queue.remove(&unit_id),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Scheduler lagged behind registry events, resyncing");
                for unit in ctx.registry.snapshot() {
                    let busy = ctx.registry.slot(&unit.id).is_some_and(|s| s.is_probing());
                    if !busy && !queue.contains(&unit.id) {
                        queue.schedule(&unit.id, ctx.initial_due(&unit));
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
