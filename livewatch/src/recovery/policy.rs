//! Recovery tunables and check spacing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::UnitStatus;
use crate::{Error, Result};

/// Thresholds and intervals that drive the unit state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Consecutive failures before a degraded unit enters recovery.
    pub failure_threshold: u32,
    /// Failed checks allowed while recovering before giving up.
    pub max_recovery_attempts: u32,
    /// Growth factor applied per backoff level.
    pub backoff_factor: f64,
    pub max_backoff_level: u32,
    pub check_interval_secs: u64,
    pub degraded_interval_secs: u64,
    pub recovery_base_delay_secs: u64,
    pub recovery_max_delay_secs: u64,
    pub unavailable_base_delay_secs: u64,
    pub unavailable_max_delay_secs: u64,
    /// Cool-down after the resolver reports the source as gone.
    pub not_found_cooldown_secs: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            max_recovery_attempts: 5,
            backoff_factor: 2.0,
            max_backoff_level: 16,
            check_interval_secs: 60,
            degraded_interval_secs: 15,
            recovery_base_delay_secs: 10,
            recovery_max_delay_secs: 300,
            unavailable_base_delay_secs: 300,
            unavailable_max_delay_secs: 6 * 60 * 60,
            not_found_cooldown_secs: 30 * 60,
        }
    }
}

impl RecoveryPolicy {
    /// Consecutive failures after which a unit is marked unavailable.
    pub fn unavailable_after(&self) -> u32 {
        self.failure_threshold.saturating_add(self.max_recovery_attempts)
    }

    pub fn not_found_cooldown(&self) -> Duration {
        Duration::from_secs(self.not_found_cooldown_secs)
    }

    /// Spacing before the next check of a unit in `status` at `level`.
    ///
    /// `min(base(status) * factor^level, max(status))`. Unavailable units count
    /// levels from the point they gave up, so the long interval starts at its base.
    pub fn interval(&self, status: UnitStatus, level: u32) -> Duration {
        let (base, max, exponent) = match status {
            UnitStatus::Healthy => (
                self.check_interval_secs,
                self.check_interval_secs.max(self.recovery_max_delay_secs),
                level,
            ),
            UnitStatus::Degraded => (
                self.degraded_interval_secs,
                self.degraded_interval_secs.max(self.recovery_max_delay_secs),
                level,
            ),
            UnitStatus::Unknown | UnitStatus::Recovering => {
                (self.recovery_base_delay_secs, self.recovery_max_delay_secs, level)
            }
            UnitStatus::Unavailable => (
                self.unavailable_base_delay_secs,
                self.unavailable_max_delay_secs,
                level.saturating_sub(self.unavailable_after()),
            ),
        };

        let scaled = base as f64 * self.backoff_factor.powi(exponent.min(i32::MAX as u32) as i32);
        let secs = scaled.min(max as f64).max(0.0);
        Duration::from_secs_f64(secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::config("recovery.failure_threshold must be at least 1"));
        }
        if self.max_recovery_attempts == 0 {
            return Err(Error::config("recovery.max_recovery_attempts must be at least 1"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::config(format!(
                "recovery.backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.unavailable_after() >= self.max_backoff_level {
            return Err(Error::config(format!(
                "recovery.max_backoff_level ({}) must exceed failure_threshold + max_recovery_attempts ({})",
                self.max_backoff_level,
                self.unavailable_after()
            )));
        }
        if self.check_interval_secs == 0
            || self.degraded_interval_secs == 0
            || self.recovery_base_delay_secs == 0
            || self.unavailable_base_delay_secs == 0
        {
            return Err(Error::config("recovery intervals must be non-zero"));
        }
        if self.recovery_max_delay_secs < self.recovery_base_delay_secs {
            return Err(Error::config(
                "recovery.recovery_max_delay_secs is below recovery_base_delay_secs",
            ));
        }
        if self.unavailable_max_delay_secs < self.unavailable_base_delay_secs {
            return Err(Error::config(
                "recovery.unavailable_max_delay_secs is below unavailable_base_delay_secs",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RecoveryPolicy::default();
        policy.validate().unwrap();
        assert_eq!(policy.unavailable_after(), 8);
    }

    #[test]
    fn test_base_intervals() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.interval(UnitStatus::Healthy, 0), Duration::from_secs(60));
        assert_eq!(policy.interval(UnitStatus::Degraded, 0), Duration::from_secs(15));
        assert_eq!(policy.interval(UnitStatus::Recovering, 0), Duration::from_secs(10));
        assert_eq!(policy.interval(UnitStatus::Unknown, 0), Duration::from_secs(10));
    }

    #[test]
    fn test_recovering_grows_then_caps() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.interval(UnitStatus::Recovering, 3), Duration::from_secs(80));
        assert_eq!(policy.interval(UnitStatus::Recovering, 10), Duration::from_secs(300));
    }

    #[test]
    fn test_unavailable_counts_from_give_up_level() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.interval(UnitStatus::Unavailable, 8), Duration::from_secs(300));
        assert_eq!(policy.interval(UnitStatus::Unavailable, 9), Duration::from_secs(600));
        assert_eq!(
            policy.interval(UnitStatus::Unavailable, 16),
            Duration::from_secs(6 * 60 * 60)
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let policy = RecoveryPolicy {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());

        let policy = RecoveryPolicy {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_backoff_cap_at_give_up_level() {
        let policy = RecoveryPolicy {
            failure_threshold: 10,
            max_recovery_attempts: 10,
            ..Default::default()
        };
        assert!(policy.validate().is_err());

        let policy = RecoveryPolicy {
            max_backoff_level: 20,
            ..policy
        };
        assert!(policy.validate().is_err());

        let policy = RecoveryPolicy {
            max_backoff_level: 21,
            ..policy
        };
        policy.validate().unwrap();
    }
}
