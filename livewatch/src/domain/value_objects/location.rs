//! Geographic location of a unit.

use serde::{Deserialize, Serialize};

/// Key used in the catalog hierarchy for a missing location part.
pub const UNSPECIFIED: &str = "_";

/// Ordered location of a unit: country, state, city. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Location {
    pub fn new(
        country: Option<String>,
        state: Option<String>,
        city: Option<String>,
    ) -> Self {
        Self {
            country: clean(country),
            state: clean(state),
            city: clean(city),
        }
    }

    /// Build a location from a free-form hint such as `"Florianópolis, SC"`
    /// and a sector code such as `"BR"`.
    ///
    /// The first comma-separated part is the city, the last the state.
    pub fn from_hint(hint: &str, sector: &str) -> Self {
        let parts: Vec<&str> = hint
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let (city, state) = match parts.as_slice() {
            [] => (None, None),
            [city] => (Some(*city), None),
            [city, .., state] => (Some(*city), Some(*state)),
        };

        Self::new(
            Some(sector.to_string()),
            state.map(str::to_string),
            city.map(str::to_string),
        )
    }

    /// Catalog keys for this location, using `"_"` for missing parts.
    pub fn catalog_keys(&self) -> (&str, &str, &str) {
        (
            self.country.as_deref().unwrap_or(UNSPECIFIED),
            self.state.as_deref().unwrap_or(UNSPECIFIED),
            self.city.as_deref().unwrap_or(UNSPECIFIED),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.state.is_none() && self.city.is_none()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

fn clean(part: Option<String>) -> Option<String> {
    part.map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && p != UNSPECIFIED)
}
