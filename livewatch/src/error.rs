//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog at {path} is corrupt: {reason}")]
    CatalogCorrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn catalog_corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CatalogCorrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Failure to turn a source query into a playable stream handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The source no longer exists or has no live broadcast.
    #[error("source not found: {0}")]
    NotFound(String),
    /// The upstream refused the request because of request volume.
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),
    /// The source cannot be handled by the resolver.
    #[error("unsupported source: {0}")]
    Unsupported(String),
    /// Any other failure; retrying later may succeed.
    #[error("transient resolution failure: {0}")]
    Transient(String),
}

impl ResolutionError {
    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::RateLimited(_) => "rate_limited",
            Self::Unsupported(_) => "unsupported",
            Self::Transient(_) => "transient",
        }
    }
}

/// Failure to fetch frames from a playback URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("no frame arrived within {0:?}")]
    Timeout(std::time::Duration),
    #[error("stream unreachable: {0}")]
    Unreachable(String),
    #[error("failed to decode frames: {0}")]
    DecodeFailure(String),
}

/// Registry mutation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A unit with the same normalised source query already exists.
    #[error("duplicate unit: {key} already registered as {existing_id}")]
    DuplicateUnit { key: String, existing_id: String },
    #[error("unit not found: {0}")]
    NotFound(String),
}

/// Discovery search failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("search rate limited: {0}")]
    RateLimited(String),
    #[error("search failed: {0}")]
    Failed(String),
    #[error("malformed search response: {0}")]
    Malformed(String),
}
