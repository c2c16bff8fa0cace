//! Catalog storage.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::model::{CATALOG_VERSION, Catalog};
use crate::domain::Unit;
use crate::utils::fs::{io_error, write_atomic};
use crate::{Error, Result};

/// Destination of catalog flushes.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    async fn save(&self, catalog: &Catalog) -> Result<()>;
}

/// Catalog kept as one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonCatalogStore {
    path: PathBuf,
}

impl JsonCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the catalog. A missing file is an empty catalog; anything
    /// unreadable or unparseable is [`Error::CatalogCorrupt`].
    pub fn load(&self) -> Result<Catalog> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No catalog found, starting empty");
                return Ok(Catalog::default());
            }
            Err(e) => return Err(Error::catalog_corrupt(&self.path, e.to_string())),
        };

        let catalog: Catalog = serde_json::from_slice(&bytes)
            .map_err(|e| Error::catalog_corrupt(&self.path, e.to_string()))?;
        if catalog.version != CATALOG_VERSION {
            return Err(Error::catalog_corrupt(
                &self.path,
                format!("unsupported catalog version {}", catalog.version),
            ));
        }
        Ok(catalog)
    }

    /// Load and check every record: invariants hold, ids and sources are unique.
    pub fn load_units(&self) -> Result<Vec<Unit>> {
        let units = self.load()?.into_units();

        let mut ids = HashSet::new();
        let mut keys = HashSet::new();
        for unit in &units {
            unit.validate()
                .map_err(|e| Error::catalog_corrupt(&self.path, e.to_string()))?;
            if !ids.insert(unit.id.as_str()) {
                return Err(Error::catalog_corrupt(
                    &self.path,
                    format!("duplicate unit id {}", unit.id),
                ));
            }
            if !keys.insert(unit.dedup_key()) {
                return Err(Error::catalog_corrupt(
                    &self.path,
                    format!("duplicate source {}", unit.source_query),
                ));
            }
        }

        info!(path = %self.path.display(), "Loaded {} units from catalog", units.len());
        Ok(units)
    }

    /// Serialise and atomically replace the file.
    pub fn save_sync(&self, catalog: &Catalog) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(catalog)?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), units = catalog.len(), "Catalog written");
        Ok(())
    }
}

#[async_trait]
impl CatalogSink for JsonCatalogStore {
    async fn save(&self, catalog: &Catalog) -> Result<()> {
        let store = self.clone();
        let catalog = catalog.clone();
        tokio::task::spawn_blocking(move || store.save_sync(&catalog))
            .await
            .map_err(|e| {
                io_error(
                    "writing catalog",
                    &self.path,
                    std::io::Error::other(e.to_string()),
                )
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Location, SourceQuery, UnitStatus};

    fn unit(name: &str, url: &str) -> Unit {
        Unit::new(
            name,
            Location::from_hint("Rio de Janeiro, RJ", "BR"),
            SourceQuery::parse(url).unwrap(),
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("catalog.json"));
        assert!(store.load_units().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("catalog.json"));
        let units = vec![unit("A", "https://youtu.be/a"), unit("B", "https://youtu.be/b")];
        store.save_sync(&Catalog::from_units(&units)).unwrap();

        let mut loaded = store.load_units().unwrap();
        loaded.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        assert_eq!(loaded, units);
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, b"{\"version\": 1, \"countries\": ").unwrap();
        let err = JsonCatalogStore::new(&path).load_units().unwrap_err();
        assert!(matches!(err, Error::CatalogCorrupt { .. }));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, b"{\"version\": 7, \"countries\": {}}").unwrap();
        assert!(matches!(
            JsonCatalogStore::new(&path).load(),
            Err(Error::CatalogCorrupt { .. })
        ));
    }

    #[test]
    fn test_invariant_violation_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("catalog.json"));
        let mut broken = unit("A", "https://youtu.be/a");
        broken.status = UnitStatus::Healthy;
        store.save_sync(&Catalog::from_units(&[broken])).unwrap();
        assert!(matches!(store.load_units(), Err(Error::CatalogCorrupt { .. })));
    }

    #[test]
    fn test_duplicate_source_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCatalogStore::new(dir.path().join("catalog.json"));
        let units = vec![
            unit("A", "https://youtu.be/same"),
            unit("B", "https://www.youtube.com/watch?v=same"),
        ];
        store.save_sync(&Catalog::from_units(&units)).unwrap();
        assert!(matches!(store.load_units(), Err(Error::CatalogCorrupt { .. })));
    }
}
