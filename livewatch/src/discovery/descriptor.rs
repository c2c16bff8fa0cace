//! Search descriptors driving the crawler.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::Location;
use crate::{Error, Result};

/// Geographic tag attached to a search term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoTag {
    /// Free-form location hint such as `"Florianópolis, SC"`.
    #[serde(default)]
    pub location: String,
    /// Country or sector code such as `"BR"`.
    #[serde(default)]
    pub sector: String,
}

impl GeoTag {
    pub fn new(location: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            sector: sector.into(),
        }
    }

    pub fn to_location(&self) -> Location {
        Location::from_hint(&self.location, &self.sector)
    }
}

/// Where a descriptor's candidates come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `term` is a live-broadcast search term.
    #[default]
    Search,
    /// `term` is the URL of a public camera directory page scraped for HLS playlists.
    HlsPage,
}

/// A search term plus the location its results belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchDescriptor {
    pub term: String,
    #[serde(default)]
    pub geo_tag: GeoTag,
    #[serde(default)]
    pub kind: SourceKind,
}

impl SearchDescriptor {
    pub fn new(term: impl Into<String>, geo_tag: GeoTag) -> Result<Self> {
        let descriptor = Self {
            term: term.into().trim().to_string(),
            geo_tag,
            kind: SourceKind::Search,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// A directory page to scrape for `.m3u8` playlists.
    pub fn hls_page(page_url: impl Into<String>, geo_tag: GeoTag) -> Result<Self> {
        let descriptor = Self {
            term: page_url.into().trim().to_string(),
            geo_tag,
            kind: SourceKind::HlsPage,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Case- and spacing-insensitive identity of the term.
    pub fn key(&self) -> String {
        term_key(&self.term)
    }

    pub fn validate(&self) -> Result<()> {
        if self.term.trim().is_empty() {
            return Err(Error::validation("search term cannot be empty"));
        }
        if self.kind == SourceKind::HlsPage {
            let url = Url::parse(&self.term)
                .map_err(|e| Error::validation(format!("invalid page URL '{}': {e}", self.term)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::validation(format!(
                    "page URL must be http(s): {}",
                    self.term
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn term_key(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
