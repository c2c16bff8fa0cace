//! Unit entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UnitStatus;
use crate::Error;
use crate::domain::{Location, SourceQuery, StreamHandle};

/// A monitored live-video endpoint.
///
/// `status`, `consecutive_failures`, `backoff_level` and `resolved_handle` are
/// only changed by the recovery controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub location: Location,
    pub source_query: SourceQuery,
    #[serde(default)]
    pub resolved_handle: Option<StreamHandle>,
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub backoff_level: u32,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_recovered_at: Option<DateTime<Utc>>,
    /// Not due before this instant (set after a not-found resolution).
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Unit {
    /// Create a new, never-checked unit.
    pub fn new(display_name: impl Into<String>, location: Location, source_query: SourceQuery) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            location,
            source_query,
            resolved_handle: None,
            status: UnitStatus::Unknown,
            consecutive_failures: 0,
            backoff_level: 0,
            last_checked_at: None,
            last_recovered_at: None,
            cooldown_until: None,
            created_at: Utc::now(),
        }
    }

    /// Normalised key used to detect duplicates.
    pub fn dedup_key(&self) -> String {
        self.source_query.dedup_key()
    }

    /// Whether the next check must resolve the source first.
    pub fn needs_resolution(&self) -> bool {
        self.resolved_handle.is_none() || self.status == UnitStatus::Recovering
    }

    /// Whether the unit is cooling down at `now`.
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Check the structural invariants of a record.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("unit id cannot be empty"));
        }
        if self.display_name.trim().is_empty() {
            return Err(Error::validation(format!("unit {} has an empty name", self.id)));
        }
        if self.status.requires_handle() != self.resolved_handle.is_some() {
            return Err(Error::validation(format!(
                "unit {} is {} but {} a resolved handle",
                self.id,
                self.status,
                if self.resolved_handle.is_some() { "has" } else { "lacks" }
            )));
        }
        Ok(())
    }
}
