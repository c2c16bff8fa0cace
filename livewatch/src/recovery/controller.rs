//! The recovery controller folds check reports into the unit state machine.
//!
//! It is the only writer of a unit's status, failure counter, backoff level and
//! handle. Callers hold the unit's record lock while calling [`RecoveryController::apply`].

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::RecoveryPolicy;
use crate::domain::{ProbeOutcome, ProbeResult, StreamHandle, Unit, UnitStatus};
use crate::error::ResolutionError;
use crate::{Error, Result};

/// Everything a single check produced for one unit.
#[derive(Debug, Clone)]
pub enum CheckReport {
    /// Frames were probed. `resolved` is set when this check resolved a fresh handle.
    Probed {
        result: ProbeResult,
        resolved: Option<StreamHandle>,
    },
    /// Resolution failed, nothing was probed.
    ResolveFailed {
        unit_id: String,
        timestamp: DateTime<Utc>,
        error: ResolutionError,
    },
}

impl CheckReport {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Probed { result, .. } => result.timestamp,
            Self::ResolveFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Probe outcome, if frames were probed.
    pub fn outcome(&self) -> Option<ProbeOutcome> {
        match self {
            Self::Probed { result, .. } => Some(result.outcome),
            Self::ResolveFailed { .. } => None,
        }
    }
}

/// What applying a report did to a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub unit_id: String,
    pub from: UnitStatus,
    pub to: UnitStatus,
    pub consecutive_failures: u32,
    pub backoff_level: u32,
    pub handle_replaced: bool,
    pub rate_limited: bool,
}

impl Transition {
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Pure state machine over [`Unit`] records.
#[derive(Debug, Clone, Default)]
pub struct RecoveryController {
    policy: RecoveryPolicy,
}

impl RecoveryController {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Apply a check report to `unit`.
    ///
    /// On error the unit is left untouched.
    pub fn apply(&self, unit: &mut Unit, report: CheckReport) -> Result<Transition> {
        let now = report.timestamp();
        let from = unit.status;

        let transition = match report {
            CheckReport::Probed { result, resolved } if result.outcome.is_ok() => {
                self.record_success(unit, resolved, now)?
            }
            CheckReport::Probed { result, resolved } => {
                debug!(
                    unit_id = %unit.id,
                    outcome = %result.outcome,
                    latency_ms = result.latency.as_millis() as u64,
                    "Probe failed"
                );
                self.record_failure(unit, resolved, now)?
            }
            CheckReport::ResolveFailed {
                error: ResolutionError::RateLimited(msg),
                ..
            } => {
                unit.backoff_level = self.next_level(unit.backoff_level);
                unit.last_checked_at = Some(now);
                warn!(
                    unit_id = %unit.id,
                    backoff_level = unit.backoff_level,
                    "Resolver rate limited: {}", msg
                );
                Transition {
                    unit_id: unit.id.clone(),
                    from,
                    to: from,
                    consecutive_failures: unit.consecutive_failures,
                    backoff_level: unit.backoff_level,
                    handle_replaced: false,
                    rate_limited: true,
                }
            }
            CheckReport::ResolveFailed { error, .. } => {
                let not_found = matches!(error, ResolutionError::NotFound(_));
                debug!(unit_id = %unit.id, error = %error, "Resolution failed");
                let transition = self.record_failure(unit, None, now)?;
                if not_found {
                    let cooldown = chrono::Duration::from_std(self.policy.not_found_cooldown())
                        .unwrap_or_else(|_| chrono::Duration::hours(1));
                    unit.cooldown_until = Some(now + cooldown);
                }
                transition
            }
        };

        if transition.status_changed() {
            info!(
                unit_id = %unit.id,
                unit_name = %unit.display_name,
                from = %transition.from,
                to = %transition.to,
                failures = transition.consecutive_failures,
                backoff_level = transition.backoff_level,
                "Unit status changed"
            );
        }

        Ok(transition)
    }

    fn record_success(
        &self,
        unit: &mut Unit,
        resolved: Option<StreamHandle>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let from = unit.status;
        let to = from.transition_to(UnitStatus::Healthy)?;
        let handle_replaced = resolved.is_some();
        let handle = resolved
            .or_else(|| unit.resolved_handle.clone())
            .ok_or_else(|| Error::validation(format!("unit {} probed OK without a handle", unit.id)))?;

        unit.status = to;
        unit.resolved_handle = Some(handle);
        unit.consecutive_failures = 0;
        unit.backoff_level = 0;
        unit.cooldown_until = None;
        unit.last_checked_at = Some(now);
        if matches!(from, UnitStatus::Recovering | UnitStatus::Unavailable) {
            unit.last_recovered_at = Some(now);
        }

        Ok(Transition {
            unit_id: unit.id.clone(),
            from,
            to,
            consecutive_failures: 0,
            backoff_level: 0,
            handle_replaced,
            rate_limited: false,
        })
    }

    fn record_failure(
        &self,
        unit: &mut Unit,
        resolved: Option<StreamHandle>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let from = unit.status;
        let failures = unit.consecutive_failures.saturating_add(1);
        let level = self.next_level(unit.backoff_level);

        let target = match from {
            UnitStatus::Unknown if failures >= self.policy.unavailable_after() => {
                UnitStatus::Unavailable
            }
            UnitStatus::Unknown => UnitStatus::Unknown,
            UnitStatus::Healthy | UnitStatus::Degraded
                if failures >= self.policy.failure_threshold =>
            {
                UnitStatus::Recovering
            }
            UnitStatus::Healthy | UnitStatus::Degraded => UnitStatus::Degraded,
            UnitStatus::Recovering if failures >= self.policy.unavailable_after() => {
                UnitStatus::Unavailable
            }
            UnitStatus::Recovering => UnitStatus::Recovering,
            UnitStatus::Unavailable => UnitStatus::Unavailable,
        };
        let to = from.transition_to(target)?;

        // Unverified handles are dropped when the unit cannot hold one.
        let handle_replaced = to.requires_handle() && resolved.is_some();
        let handle = if to.requires_handle() {
            let handle = resolved.or_else(|| unit.resolved_handle.clone());
            if handle.is_none() {
                return Err(Error::validation(format!(
                    "unit {} would enter {} without a handle",
                    unit.id, to
                )));
            }
            handle
        } else {
            None
        };

        unit.status = to;
        unit.resolved_handle = handle;
        unit.consecutive_failures = failures;
        unit.backoff_level = level;
        unit.last_checked_at = Some(now);

        Ok(Transition {
            unit_id: unit.id.clone(),
            from,
            to,
            consecutive_failures: failures,
            backoff_level: level,
            handle_replaced,
            rate_limited: false,
        })
    }

    fn next_level(&self, level: u32) -> u32 {
        level.saturating_add(1).min(self.policy.max_backoff_level)
    }
}
