//! Bulk import of operator-supplied unit lists.
//!
//! Two formats are accepted: pipe-delimited lines
//! (`NAME | URL | LOCATION | SECTOR`, blank lines and `#` comments skipped)
//! or a JSON array of `{name, url, location, sector}` objects. Every entry
//! goes through the same admission path as crawler hits.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::candidate::{Admission, Candidate, admit_candidate};
use crate::domain::Location;
use crate::registry::UnitRegistry;
use crate::{Error, Result};

/// One operator entry before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub sector: String,
}

impl ImportEntry {
    fn into_candidate(self) -> Result<Candidate> {
        let location = Location::from_hint(&self.location, &self.sector);
        Candidate::new(&self.name, location, &self.url)
    }
}

/// Result of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub added: usize,
    pub duplicates: usize,
    pub rejected: usize,
    /// One message per rejected entry.
    pub errors: Vec<String>,
}

impl ImportReport {
    fn reject(&mut self, at: &str, reason: impl std::fmt::Display) {
        self.rejected += 1;
        self.errors.push(format!("{at}: {reason}"));
    }
}

/// Parse an import document into entries, keeping per-line parse failures.
pub fn parse_entries(text: &str) -> Result<Vec<(String, Result<ImportEntry>)>> {
    if text.trim_start().starts_with('[') {
        let entries: Vec<ImportEntry> = serde_json::from_str(text)?;
        return Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| (format!("entry {}", i + 1), Ok(entry)))
            .collect());
    }

    Ok(text
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| (format!("line {}", i + 1), parse_line(line)))
        .collect())
}

fn parse_line(line: &str) -> Result<ImportEntry> {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 2 || fields.len() > 4 {
        return Err(Error::validation(format!(
            "expected NAME | URL | LOCATION | SECTOR, got {} fields",
            fields.len()
        )));
    }
    let field = |i: usize| fields.get(i).map(|s| s.to_string()).unwrap_or_default();
    Ok(ImportEntry {
        name: field(0),
        url: field(1),
        location: field(2),
        sector: field(3),
    })
}

/// Import every entry of `text` into the registry.
///
/// Fails only when a JSON document cannot be parsed at all; individual bad
/// entries are counted as rejected.
pub fn import_units(registry: &UnitRegistry, text: &str) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for (at, entry) in parse_entries(text)? {
        let candidate = match entry.and_then(ImportEntry::into_candidate) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Rejected import {}: {}", at, e);
                report.reject(&at, e);
                continue;
            }
        };
        match admit_candidate(registry, candidate) {
            Ok(Admission::Added(_)) => report.added += 1,
            Ok(Admission::Duplicate { .. }) => report.duplicates += 1,
            Err(e) => {
                warn!("Rejected import {}: {}", at, e);
                report.reject(&at, e);
            }
        }
    }

    info!(
        added = report.added,
        duplicates = report.duplicates,
        rejected = report.rejected,
        "Import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceQuery;
    use crate::registry::UnitEventBroadcaster;

    fn registry() -> UnitRegistry {
        UnitRegistry::new(UnitEventBroadcaster::new())
    }

    #[test]
    fn test_import_pipe_lines() {
        let registry = registry();
        let text = "\
# operator list
Koxixos | https://www.youtube.com/watch?v=kox | Florianópolis, SC | BR

Shibuya | https://youtu.be/shib | Tokyo | JP
Broken line without url
Bad | not a url at all but has | too | many | fields
";
        let report = import_units(&registry, text).unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.rejected, 2);
        assert!(report.errors[0].starts_with("line 5"));

        let id = registry
            .find_by_source(&SourceQuery::parse("https://youtu.be/kox").unwrap())
            .unwrap();
        let unit = registry.get(&id).unwrap();
        assert_eq!(unit.location.country.as_deref(), Some("BR"));
        assert_eq!(unit.location.state.as_deref(), Some("SC"));
    }

    #[test]
    fn test_import_json_and_duplicates() {
        let registry = registry();
        let text = r#"[
            {"name": "Cam A", "url": "https://youtu.be/a1", "location": "Rio de Janeiro, RJ", "sector": "BR"},
            {"name": "CAM A again", "url": "https://www.youtube.com/watch?v=a1"},
            {"name": "No url", "url": ""}
        ]"#;
        let report = import_units(&registry, text).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_json_fails_whole_import() {
        assert!(import_units(&registry(), "[{\"name\": ").is_err());
    }
}
