//! Discovery of new units: the periodic crawler, directory scraping and bulk import.

pub mod candidate;
pub mod crawler;
pub mod descriptor;
pub mod hls;
pub mod import;
pub mod rate_limiter;
pub mod search;

pub use candidate::{Admission, Candidate, admit_candidate};
pub use crawler::{DiscoveryConfig, DiscoveryCrawler, DiscoveryReport};
pub use descriptor::{GeoTag, SearchDescriptor, SourceKind};
pub use hls::{HlsPageConfig, HlsPageSource};
pub use import::{ImportEntry, ImportReport, import_units};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use search::{SearchHit, SearchProvider, YtDlpSearch};
