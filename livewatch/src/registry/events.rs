//! Registry events for the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::{ProbeOutcome, UnitStatus};

/// Events emitted when the unit table changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitEvent {
    /// A unit was admitted.
    Added {
        unit_id: String,
        display_name: String,
        timestamp: DateTime<Utc>,
    },
    /// A unit was removed by the operator.
    Removed {
        unit_id: String,
        display_name: String,
        timestamp: DateTime<Utc>,
    },
    /// The recovery controller moved a unit to another status.
    StatusChanged {
        unit_id: String,
        display_name: String,
        old_status: UnitStatus,
        new_status: UnitStatus,
        consecutive_failures: u32,
        backoff_level: u32,
        playback_url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A check finished, whatever its result.
    Probed {
        unit_id: String,
        status: UnitStatus,
        /// `None` when resolution failed before probing.
        outcome: Option<ProbeOutcome>,
        resolution_error: Option<String>,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl UnitEvent {
    pub fn unit_id(&self) -> &str {
        match self {
            UnitEvent::Added { unit_id, .. }
            | UnitEvent::Removed { unit_id, .. }
            | UnitEvent::StatusChanged { unit_id, .. }
            | UnitEvent::Probed { unit_id, .. } => unit_id,
        }
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            UnitEvent::Added { display_name, .. } => format!("{} added", display_name),
            UnitEvent::Removed { display_name, .. } => format!("{} removed", display_name),
            UnitEvent::StatusChanged {
                display_name,
                old_status,
                new_status,
                ..
            } => format!("{}: {} -> {}", display_name, old_status, new_status),
            UnitEvent::Probed {
                unit_id,
                outcome: Some(outcome),
                ..
            } => format!("{} probed: {}", unit_id, outcome),
            UnitEvent::Probed {
                unit_id,
                resolution_error,
                ..
            } => format!(
                "{} resolution failed: {}",
                unit_id,
                resolution_error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Broadcaster for unit events.
#[derive(Clone)]
pub struct UnitEventBroadcaster {
    sender: broadcast::Sender<UnitEvent>,
}

impl UnitEventBroadcaster {
    /// Create a new broadcaster with default capacity (1024).
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnitEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: UnitEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for UnitEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
