//! Probe outcome and result values.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a single health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeOutcome {
    Ok,
    BlackFrame,
    Frozen,
    Unreachable,
    Timeout,
}

impl ProbeOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BlackFrame => "BLACK_FRAME",
            Self::Frozen => "FROZEN",
            Self::Unreachable => "UNREACHABLE",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral result of probing one unit. Consumed by the recovery controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub unit_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    pub latency: Duration,
}

impl ProbeResult {
    pub fn new(unit_id: impl Into<String>, outcome: ProbeOutcome, latency: Duration) -> Self {
        Self {
            unit_id: unit_id.into(),
            timestamp: Utc::now(),
            outcome,
            latency,
        }
    }
}
