//! Catalog document: the persisted view of the registry.
//!
//! Units are grouped `country -> state -> city`. Missing location parts use
//! the `"_"` key, so the hierarchy always has exactly three levels.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Location, SourceQuery, StreamHandle, UNSPECIFIED, Unit, UnitStatus};

pub const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,
    #[serde(default)]
    pub countries: BTreeMap<String, CountryEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            countries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryEntry {
    #[serde(default)]
    pub states: BTreeMap<String, StateEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    #[serde(default)]
    pub cities: BTreeMap<String, Vec<UnitSummary>>,
}

/// One unit as stored in the catalog. Its location is implied by its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub id: String,
    pub name: String,
    pub source_query: SourceQuery,
    #[serde(default)]
    pub status: UnitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<StreamHandle>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub backoff_level: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_recovered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UnitSummary {
    fn from_unit(unit: &Unit) -> Self {
        Self {
            id: unit.id.clone(),
            name: unit.display_name.clone(),
            source_query: unit.source_query.clone(),
            status: unit.status,
            handle: unit.resolved_handle.clone(),
            consecutive_failures: unit.consecutive_failures,
            backoff_level: unit.backoff_level,
            last_checked_at: unit.last_checked_at,
            last_recovered_at: unit.last_recovered_at,
            cooldown_until: unit.cooldown_until,
            created_at: unit.created_at,
        }
    }

    fn into_unit(self, location: Location) -> Unit {
        Unit {
            id: self.id,
            display_name: self.name,
            location,
            source_query: self.source_query,
            resolved_handle: self.handle,
            status: self.status,
            consecutive_failures: self.consecutive_failures,
            backoff_level: self.backoff_level,
            last_checked_at: self.last_checked_at,
            last_recovered_at: self.last_recovered_at,
            cooldown_until: self.cooldown_until,
            created_at: self.created_at,
        }
    }
}

impl Catalog {
    /// Group units into the catalog hierarchy.
    pub fn from_units(units: &[Unit]) -> Self {
        let mut catalog = Self::default();
        for unit in units {
            let (country, state, city) = unit.location.catalog_keys();
            catalog
                .countries
                .entry(country.to_string())
                .or_default()
                .states
                .entry(state.to_string())
                .or_default()
                .cities
                .entry(city.to_string())
                .or_default()
                .push(UnitSummary::from_unit(unit));
        }
        for country in catalog.countries.values_mut() {
            for state in country.states.values_mut() {
                for units in state.cities.values_mut() {
                    units.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
                }
            }
        }
        catalog
    }

    /// Flatten the hierarchy back into units.
    pub fn into_units(self) -> Vec<Unit> {
        let mut units = Vec::new();
        for (country, country_entry) in self.countries {
            for (state, state_entry) in country_entry.states {
                for (city, summaries) in state_entry.cities {
                    let location = Location::new(part(&country), part(&state), part(&city));
                    units.extend(summaries.into_iter().map(|s| s.into_unit(location.clone())));
                }
            }
        }
        units
    }

    pub fn len(&self) -> usize {
        self.countries
            .values()
            .flat_map(|c| c.states.values())
            .flat_map(|s| s.cities.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status of every unit, for listing.
    pub fn iter_summaries(&self) -> impl Iterator<Item = (&str, &str, &str, &UnitSummary)> {
        self.countries.iter().flat_map(|(country, c)| {
            c.states.iter().flat_map(move |(state, s)| {
                s.cities.iter().flat_map(move |(city, units)| {
                    units
                        .iter()
                        .map(move |u| (country.as_str(), state.as_str(), city.as_str(), u))
                })
            })
        })
    }
}

fn part(key: &str) -> Option<String> {
    (key != UNSPECIFIED).then(|| key.to_string())
}
