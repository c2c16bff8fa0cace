//! Resolver backed by the `yt-dlp` binary.

use async_trait::async_trait;
use process_utils::{lossy_trimmed, output_with_timeout, tokio_command};
use serde::Deserialize;
use tracing::{debug, trace};

use super::{Resolver, ResolverConfig};
use crate::domain::{QualityTier, SourceQuery, StreamHandle};
use crate::error::ResolutionError;

/// Subset of the `yt-dlp -J` document the resolver reads.
#[derive(Debug, Default, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    live_status: Option<String>,
    #[serde(default)]
    requested_formats: Vec<YtDlpFormat>,
    #[serde(default)]
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: String,
    #[serde(default)]
    height: Option<u32>,
}

pub struct YtDlpResolver {
    config: ResolverConfig,
}

impl YtDlpResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    fn build_args(&self, query: &SourceQuery) -> Vec<String> {
        vec![
            "-J".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            query.resolver_target(),
        ]
    }

    fn parse_info(stdout: &[u8]) -> Result<StreamHandle, ResolutionError> {
        let info: YtDlpInfo = serde_json::from_slice(stdout)
            .map_err(|e| ResolutionError::Transient(format!("unparseable yt-dlp output: {e}")))?;

        let info = match info.entries {
            Some(entries) => entries
                .into_iter()
                .flatten()
                .next()
                .ok_or_else(|| ResolutionError::NotFound("No video results".to_string()))?,
            None => info,
        };

        if let Some(status) = info.live_status.as_deref() {
            if matches!(status, "was_live" | "post_live" | "not_live") {
                return Err(ResolutionError::NotFound(format!("stream is {status}")));
            }
        }

        let (url, height) = match info.url {
            Some(url) => (url, info.height),
            None => {
                let best = info
                    .requested_formats
                    .into_iter()
                    .max_by_key(|f| f.height.unwrap_or(0))
                    .ok_or_else(|| {
                        ResolutionError::Transient("yt-dlp returned no playable format".into())
                    })?;
                (best.url, best.height.or(info.height))
            }
        };

        Ok(StreamHandle::new(url, QualityTier::from_height(height)))
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &SourceQuery) -> Result<StreamHandle, ResolutionError> {
        if query.is_direct_media() {
            return Ok(StreamHandle::new(query.as_str(), QualityTier::Unknown));
        }

        let args = self.build_args(query);
        trace!(args = ?args, "Running yt-dlp");

        let mut cmd = tokio_command(&self.config.ytdlp_path);
        cmd.args(&args);

        let output = output_with_timeout(cmd, self.config.timeout())
            .await
            .map_err(|e| {
                if e.is_missing_program() {
                    ResolutionError::Unsupported(format!(
                        "{} is not installed",
                        self.config.ytdlp_path
                    ))
                } else {
                    ResolutionError::Transient(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = lossy_trimmed(&output.stderr);
            debug!(query = %query, stderr = %stderr, "yt-dlp failed");
            return Err(classify_stderr(&stderr));
        }

        Self::parse_info(&output.stdout)
    }
}

/// Map yt-dlp error output onto the resolution taxonomy.
pub fn classify_stderr(stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("yt-dlp failed")
        .trim()
        .to_string();

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit")
    {
        ResolutionError::RateLimited(message)
    } else if lower.contains("unsupported url") {
        ResolutionError::Unsupported(message)
    } else if lower.contains("unavailable")
        || lower.contains("not found")
        || lower.contains("has ended")
        || lower.contains("private video")
        || lower.contains("no video results")
    {
        ResolutionError::NotFound(message)
    } else {
        ResolutionError::Transient(message)
    }
}
