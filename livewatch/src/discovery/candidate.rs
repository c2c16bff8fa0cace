//! Candidate units and the shared admission path.
//!
//! Crawler hits and operator imports are both normalised into a [`Candidate`]
//! and admitted through [`admit_candidate`], so they share validation and
//! dedup rules.

use tracing::debug;

use super::SearchDescriptor;
use super::search::SearchHit;
use crate::domain::{Location, SourceQuery, Unit};
use crate::error::RegistryError;
use crate::registry::{NewUnit, UnitRegistry};
use crate::{Error, Result};

/// Name used when a source carries no usable title.
pub const UNTITLED: &str = "Untitled camera";

/// A normalised discovery result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub location: Location,
    pub source_query: SourceQuery,
}

impl Candidate {
    pub fn new(title: &str, location: Location, source: &str) -> Result<Self> {
        let title = sanitize_title(title);
        Ok(Self {
            title: if title.is_empty() { UNTITLED.to_string() } else { title },
            location,
            source_query: SourceQuery::parse(source)?,
        })
    }

    /// Normalise a raw search hit. The hit's own geo hint wins over the descriptor's.
    pub fn from_hit(hit: &SearchHit, descriptor: &SearchDescriptor) -> Result<Self> {
        let location = match hit.geo_hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => {
                Location::from_hint(hint, &descriptor.geo_tag.sector)
            }
            _ => descriptor.geo_tag.to_location(),
        };
        Self::new(&hit.title, location, &hit.page_ref)
    }

    pub fn into_new_unit(self) -> NewUnit {
        NewUnit::new(self.title, self.location, self.source_query)
    }
}

/// Result of offering one candidate to the registry.
#[derive(Debug)]
pub enum Admission {
    Added(Unit),
    Duplicate { existing_id: String },
}

/// Admit a candidate as an `UNKNOWN` unit; duplicates are not an error.
pub fn admit_candidate(registry: &UnitRegistry, candidate: Candidate) -> Result<Admission> {
    match registry.admit(candidate.into_new_unit()) {
        Ok(unit) => Ok(Admission::Added(unit)),
        Err(Error::Registry(RegistryError::DuplicateUnit { key, existing_id })) => {
            debug!(key = %key, existing_id = %existing_id, "Candidate already registered");
            Ok(Admission::Duplicate { existing_id })
        }
        Err(e) => Err(e),
    }
}

/// Make a title safe for the pipe-delimited import format.
pub fn sanitize_title(title: &str) -> String {
    title
        .replace('|', "-")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
