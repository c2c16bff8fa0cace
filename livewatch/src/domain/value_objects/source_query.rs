//! Source query value object.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// What the resolver is asked to turn into a playable stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceQuery {
    /// A page or media URL.
    Url(String),
    /// A free-text search term.
    Search(String),
}

impl SourceQuery {
    /// Parse operator or crawler input. Anything with an http(s) scheme is a URL.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::validation("source query cannot be empty"));
        }

        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let parsed = Url::parse(input)
                .map_err(|e| Error::validation(format!("invalid source URL '{input}': {e}")))?;
            if parsed.host_str().is_none() {
                return Err(Error::validation(format!("source URL has no host: {input}")));
            }
            return Ok(Self::Url(input.to_string()));
        }

        Ok(Self::Search(collapse_whitespace(input)))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) | Self::Search(s) => s,
        }
    }

    /// Normalised key used for deduplication.
    ///
    /// YouTube URLs collapse to their video id. Other URLs get a lower-cased
    /// scheme and host and lose trailing slashes; path and query keep their
    /// case. Search terms are lower-cased with single spaces.
    pub fn dedup_key(&self) -> String {
        match self {
            Self::Url(raw) => match youtube_video_id(raw) {
                Some(id) => format!("youtube:{id}"),
                None => format!("url:{}", normalize_url(raw)),
            },
            Self::Search(term) => format!("search:{}", collapse_whitespace(term).to_lowercase()),
        }
    }

    /// Whether the URL already points at playable media and needs no resolution.
    pub fn is_direct_media(&self) -> bool {
        let Self::Url(raw) = self else {
            return false;
        };
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        let path = url.path().to_ascii_lowercase();
        path.ends_with(".m3u8")
            || path.ends_with(".mjpg")
            || path.ends_with(".jpg")
            || path.ends_with(".jpeg")
            || path.contains("/mjpg/")
    }

    /// Argument passed to the resolver tool.
    pub fn resolver_target(&self) -> String {
        match self {
            Self::Url(raw) => match youtube_video_id(raw) {
                Some(id) => format!("https://www.youtube.com/watch?v={id}"),
                None => raw.clone(),
            },
            Self::Search(term) => format!("ytsearch1:{term} live"),
        }
    }
}

impl std::fmt::Display for SourceQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extract the video id from the common YouTube URL shapes.
pub fn youtube_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.strip_prefix("m.").unwrap_or(host);

    let id = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("live" | "embed" | "shorts") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// `Url` already lower-cases scheme and host and drops default ports.
fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
