//! Discovery search capability.

use std::time::Duration;

use async_trait::async_trait;
use process_utils::{lossy_trimmed, output_with_timeout, tokio_command};
use serde::Deserialize;
use tracing::{debug, trace};

use super::GeoTag;
use crate::error::{ResolutionError, SearchError};
use crate::resolver::classify_stderr;

/// One raw result of a live search, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    /// Page URL of the broadcast.
    pub page_ref: String,
    pub geo_hint: Option<String>,
}

/// External live-broadcast search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, term: &str, geo_tag: &GeoTag) -> Result<Vec<SearchHit>, SearchError>;
}

#[derive(Debug, Default, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Vec<Option<FlatEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct FlatEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    live_status: Option<String>,
    #[serde(default)]
    is_live: Option<bool>,
    #[serde(default)]
    duration: Option<f64>,
}

impl FlatEntry {
    fn is_live(&self) -> bool {
        if let Some(status) = self.live_status.as_deref() {
            return status == "is_live";
        }
        if let Some(live) = self.is_live {
            return live;
        }
        self.duration.is_none()
            || self
                .title
                .as_deref()
                .is_some_and(|t| t.to_uppercase().contains("LIVE"))
    }

    fn page_ref(&self) -> Option<String> {
        match (&self.url, &self.id) {
            (Some(url), _) if url.starts_with("http") => Some(url.clone()),
            (_, Some(id)) if !id.is_empty() => Some(format!("https://www.youtube.com/watch?v={id}")),
            _ => None,
        }
    }
}

/// Searches YouTube through `yt-dlp --flat-playlist`.
pub struct YtDlpSearch {
    ytdlp_path: String,
    results_per_term: u32,
    timeout: Duration,
}

impl YtDlpSearch {
    pub fn new(ytdlp_path: impl Into<String>, results_per_term: u32, timeout: Duration) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            results_per_term: results_per_term.max(1),
            timeout,
        }
    }

    fn search_target(&self, term: &str) -> String {
        let has_live = term
            .split_whitespace()
            .any(|word| word.eq_ignore_ascii_case("live"));
        if has_live {
            format!("ytsearch{}:{}", self.results_per_term, term.trim())
        } else {
            format!("ytsearch{}:{} live", self.results_per_term, term.trim())
        }
    }

    fn parse_hits(stdout: &[u8]) -> Result<Vec<SearchHit>, SearchError> {
        let playlist: FlatPlaylist = serde_json::from_slice(stdout)
            .map_err(|e| SearchError::Malformed(e.to_string()))?;

        Ok(playlist
            .entries
            .into_iter()
            .flatten()
            .filter(FlatEntry::is_live)
            .filter_map(|entry| {
                let page_ref = entry.page_ref()?;
                Some(SearchHit {
                    title: entry.title.unwrap_or_default(),
                    page_ref,
                    geo_hint: None,
                })
            })
            .collect())
    }
}

#[async_trait]
impl SearchProvider for YtDlpSearch {
    async fn search(&self, term: &str, _geo_tag: &GeoTag) -> Result<Vec<SearchHit>, SearchError> {
        let target = self.search_target(term);
        trace!(target = %target, "Running yt-dlp search");

        let mut cmd = tokio_command(&self.ytdlp_path);
        cmd.args(["-J", "--flat-playlist", "--no-warnings", target.as_str()]);

        let output = output_with_timeout(cmd, self.timeout)
            .await
            .map_err(|e| SearchError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = lossy_trimmed(&output.stderr);
            return Err(match classify_stderr(&stderr) {
                ResolutionError::RateLimited(msg) => SearchError::RateLimited(msg),
                other => SearchError::Failed(other.to_string()),
            });
        }

        let hits = Self::parse_hits(&output.stdout)?;
        debug!(term = %term, hits = hits.len(), "Search finished");
        Ok(hits)
    }
}
