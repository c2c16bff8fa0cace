//! In-memory unit table.
//!
//! The registry is the single source of truth for unit state at runtime.
//! Each unit lives in its own slot: a record lock for atomic read-modify-write
//! and a probe gate that serialises whole checks on that unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, broadcast};
use tracing::{debug, info};

use super::events::{UnitEvent, UnitEventBroadcaster};
use crate::domain::{Location, SourceQuery, Unit, UnitStatus};
use crate::error::RegistryError;
use crate::{Error, Result};

/// Operator- or crawler-supplied description of a unit to admit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub display_name: String,
    #[serde(default)]
    pub location: Location,
    pub source_query: SourceQuery,
}

impl NewUnit {
    pub fn new(display_name: impl Into<String>, location: Location, source_query: SourceQuery) -> Self {
        Self {
            display_name: display_name.into(),
            location,
            source_query,
        }
    }

    fn into_unit(self) -> Unit {
        let name = self.display_name.trim();
        let name = if name.is_empty() {
            self.source_query.as_str().to_string()
        } else {
            name.to_string()
        };
        Unit::new(name, self.location, self.source_query)
    }
}

/// One registry entry.
pub struct UnitSlot {
    record: parking_lot::Mutex<Unit>,
    probe_gate: tokio::sync::Mutex<()>,
}

impl UnitSlot {
    fn new(unit: Unit) -> Self {
        Self {
            record: parking_lot::Mutex::new(unit),
            probe_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> Unit {
        self.record.lock().clone()
    }

    /// Hold this while checking the unit; checks on one unit never overlap.
    pub async fn lock_probe(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.probe_gate.lock().await
    }

    /// Whether a check currently holds the probe gate.
    pub fn is_probing(&self) -> bool {
        self.probe_gate.try_lock().is_err()
    }
}

/// Unit counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub recovering: usize,
    pub unavailable: usize,
    pub unknown: usize,
}

impl StatusCounts {
    fn add(&mut self, status: UnitStatus) {
        match status {
            UnitStatus::Healthy => self.healthy += 1,
            UnitStatus::Degraded => self.degraded += 1,
            UnitStatus::Recovering => self.recovering += 1,
            UnitStatus::Unavailable => self.unavailable += 1,
            UnitStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, status: UnitStatus) -> usize {
        match status {
            UnitStatus::Healthy => self.healthy,
            UnitStatus::Degraded => self.degraded,
            UnitStatus::Recovering => self.recovering,
            UnitStatus::Unavailable => self.unavailable,
            UnitStatus::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        UnitStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

pub struct UnitRegistry {
    units: DashMap<String, Arc<UnitSlot>>,
    /// Dedup key -> unit id.
    by_key: DashMap<String, String>,
    events: UnitEventBroadcaster,
    dirty: Arc<Notify>,
    revision: AtomicU64,
}

impl UnitRegistry {
    pub fn new(events: UnitEventBroadcaster) -> Self {
        Self {
            units: DashMap::new(),
            by_key: DashMap::new(),
            events,
            dirty: Arc::new(Notify::new()),
            revision: AtomicU64::new(0),
        }
    }

    /// Build a registry from persisted records.
    ///
    /// Fails on invalid records or duplicate ids and keys; seeding does not
    /// emit events or mark the registry dirty.
    pub fn seeded(units: Vec<Unit>, events: UnitEventBroadcaster) -> Result<Self> {
        let registry = Self::new(events);
        let count = units.len();
        for unit in units {
            unit.validate()?;
            registry.insert(unit)?;
        }
        info!("Seeded registry with {} units", count);
        Ok(registry)
    }

    /// Admit a new unit in `UNKNOWN` status.
    ///
    /// The dedup key is claimed atomically, so two racing admissions of the
    /// same source cannot both succeed.
    pub fn admit(&self, new_unit: NewUnit) -> Result<Unit> {
        let unit = new_unit.into_unit();
        unit.validate()?;
        self.insert(unit.clone())?;

        debug!(unit_id = %unit.id, name = %unit.display_name, "Unit admitted");
        self.events.publish(UnitEvent::Added {
            unit_id: unit.id.clone(),
            display_name: unit.display_name.clone(),
            timestamp: Utc::now(),
        });
        self.mark_dirty();
        Ok(unit)
    }

    fn insert(&self, unit: Unit) -> std::result::Result<(), RegistryError> {
        match self.by_key.entry(unit.dedup_key()) {
            Entry::Occupied(existing) => Err(RegistryError::DuplicateUnit {
                key: existing.key().clone(),
                existing_id: existing.get().clone(),
            }),
            Entry::Vacant(vacant) => {
                if let Some(existing) = self.units.get(&unit.id) {
                    return Err(RegistryError::DuplicateUnit {
                        key: unit.id.clone(),
                        existing_id: existing.key().clone(),
                    });
                }
                vacant.insert(unit.id.clone());
                self.units.insert(unit.id.clone(), Arc::new(UnitSlot::new(unit)));
                Ok(())
            }
        }
    }

    /// Remove a unit. Its catalog entry disappears with the next flush.
    pub fn remove(&self, id: &str) -> Result<Unit> {
        let (_, slot) = self
            .units
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let unit = slot.snapshot();
        self.by_key.remove_if(&unit.dedup_key(), |_, owner| owner == id);

        info!(unit_id = %id, name = %unit.display_name, "Unit removed");
        self.events.publish(UnitEvent::Removed {
            unit_id: unit.id.clone(),
            display_name: unit.display_name.clone(),
            timestamp: Utc::now(),
        });
        self.mark_dirty();
        Ok(unit)
    }

    /// Atomically update one unit.
    ///
    /// `f` works on a copy taken under the unit's record lock; the copy
    /// replaces the record only if `f` succeeds.
    pub fn update_with<T>(&self, id: &str, f: impl FnOnce(&mut Unit) -> Result<T>) -> Result<T> {
        let slot = self
            .slot(id)
            .ok_or_else(|| Error::from(RegistryError::NotFound(id.to_string())))?;

        let value = {
            let mut record = slot.record.lock();
            let mut next = record.clone();
            let value = f(&mut next)?;
            *record = next;
            value
        };

        self.mark_dirty();
        Ok(value)
    }

    pub fn slot(&self, id: &str) -> Option<Arc<UnitSlot>> {
        self.units.get(id).map(|entry| entry.value().clone())
    }

    pub fn get(&self, id: &str) -> Option<Unit> {
        self.slot(id).map(|slot| slot.snapshot())
    }

    /// Id of the unit owning `source`, if any.
    pub fn find_by_source(&self, source: &SourceQuery) -> Option<String> {
        self.by_key
            .get(&source.dedup_key())
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Consistent-per-unit copy of every record, ordered by location then name.
    pub fn snapshot(&self) -> Vec<Unit> {
        let slots: Vec<Arc<UnitSlot>> = self.units.iter().map(|e| e.value().clone()).collect();
        let mut units: Vec<Unit> = slots.iter().map(|slot| slot.snapshot()).collect();
        units.sort_by(|a, b| {
            a.location
                .catalog_keys()
                .cmp(&b.location.catalog_keys())
                .then_with(|| a.display_name.cmp(&b.display_name))
                .then_with(|| a.id.cmp(&b.id))
        });
        units
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.units.iter() {
            counts.add(entry.value().record.lock().status);
        }
        counts
    }

    pub fn publish(&self, event: UnitEvent) {
        self.events.publish(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnitEvent> {
        self.events.subscribe()
    }

    /// Record a change that the catalog writer must persist.
    pub fn mark_dirty(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
        self.dirty.notify_one();
    }

    /// Monotonic counter bumped on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn dirty_notifier(&self) -> Arc<Notify> {
        self.dirty.clone()
    }
}
