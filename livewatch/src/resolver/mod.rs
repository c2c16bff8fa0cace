//! Resolver adapter: turns a source query into a playable stream handle.

mod ytdlp;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{QualityTier, SourceQuery, StreamHandle};
use crate::error::ResolutionError;

pub use ytdlp::{YtDlpResolver, classify_stderr};

/// Stream resolution capability.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `query`, preferring the highest available quality tier.
    async fn resolve(&self, query: &SourceQuery) -> Result<StreamHandle, ResolutionError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub ytdlp_path: String,
    /// yt-dlp format selector.
    pub format: String,
    pub timeout_secs: u64,
    /// Tier below which a resolution is logged as degraded quality.
    pub min_quality: QualityTier,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            format: "best".to_string(),
            timeout_secs: 30,
            min_quality: QualityTier::Hd,
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.ytdlp_path.trim().is_empty() {
            return Err(crate::Error::config("resolver.ytdlp_path cannot be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::config("resolver.timeout_secs must be non-zero"));
        }
        Ok(())
    }
}
