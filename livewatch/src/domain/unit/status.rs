//! Unit health state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Health status of a monitored unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    /// Delivering a live, non-degraded signal.
    Healthy,
    /// Failed recently, below the escalation threshold.
    Degraded,
    /// Sustained failure; every check re-resolves the stream.
    Recovering,
    /// Recovery gave up; retried on a long, growing interval.
    Unavailable,
    /// Never verified since creation.
    #[default]
    Unknown,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        Self::Healthy,
        Self::Degraded,
        Self::Recovering,
        Self::Unavailable,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Recovering => "RECOVERING",
            Self::Unavailable => "UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a status name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HEALTHY" => Some(Self::Healthy),
            "DEGRADED" => Some(Self::Degraded),
            "RECOVERING" => Some(Self::Recovering),
            "UNAVAILABLE" => Some(Self::Unavailable),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Whether a unit in this status must hold a resolved handle.
    pub fn requires_handle(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded | Self::Recovering)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: UnitStatus) -> bool {
        use UnitStatus::*;

        match (self, target) {
            (from, to) if *from == to => true,

            // Any verified probe heals.
            (_, Healthy) => true,

            (Unknown, Unavailable) => true,
            (Healthy, Degraded | Recovering) => true,
            (Degraded, Recovering) => true,
            (Recovering, Unavailable) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new status.
    pub fn transition_to(&self, target: UnitStatus) -> Result<UnitStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_as_str() {
        for status in UnitStatus::ALL {
            assert_eq!(UnitStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UnitStatus::parse(" healthy "), Some(UnitStatus::Healthy));
        assert_eq!(UnitStatus::parse("broken"), None);
    }

    #[test]
    fn test_requires_handle() {
        assert!(UnitStatus::Healthy.requires_handle());
        assert!(UnitStatus::Recovering.requires_handle());
        assert!(!UnitStatus::Unknown.requires_handle());
        assert!(!UnitStatus::Unavailable.requires_handle());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(UnitStatus::Unknown.can_transition_to(UnitStatus::Healthy));
        assert!(UnitStatus::Healthy.can_transition_to(UnitStatus::Degraded));
        assert!(UnitStatus::Degraded.can_transition_to(UnitStatus::Recovering));
        assert!(UnitStatus::Recovering.can_transition_to(UnitStatus::Unavailable));
        assert!(UnitStatus::Unavailable.can_transition_to(UnitStatus::Healthy));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!UnitStatus::Unknown.can_transition_to(UnitStatus::Degraded));
        assert!(!UnitStatus::Unavailable.can_transition_to(UnitStatus::Recovering));
        assert!(!UnitStatus::Degraded.can_transition_to(UnitStatus::Unavailable));

        let err = UnitStatus::Unavailable
            .transition_to(UnitStatus::Degraded)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&UnitStatus::Recovering).unwrap();
        assert_eq!(json, "\"RECOVERING\"");
    }
}
