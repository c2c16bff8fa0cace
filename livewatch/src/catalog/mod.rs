//! Persisted catalog of units.

pub mod model;
pub mod store;
pub mod writer;

pub use model::{CATALOG_VERSION, Catalog, CountryEntry, StateEntry, UnitSummary};
pub use store::{CatalogSink, JsonCatalogStore};
pub use writer::{CatalogWriter, PersistenceConfig};
