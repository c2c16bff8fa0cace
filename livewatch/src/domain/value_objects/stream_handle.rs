//! Resolved stream handle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality tier reported by the resolver, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    /// The resolver could not tell (direct media URLs).
    #[default]
    Unknown,
    Low,
    Sd,
    Hd,
    FullHd,
    Uhd,
}

impl QualityTier {
    /// Map a vertical resolution to a tier.
    pub fn from_height(height: Option<u32>) -> Self {
        match height {
            None | Some(0) => Self::Unknown,
            Some(h) if h >= 1440 => Self::Uhd,
            Some(h) if h >= 1080 => Self::FullHd,
            Some(h) if h >= 720 => Self::Hd,
            Some(h) if h >= 480 => Self::Sd,
            Some(_) => Self::Low,
        }
    }

    /// Whether this tier is known to be below `min`. Unknown tiers never are.
    pub fn is_below(&self, min: QualityTier) -> bool {
        *self != Self::Unknown && *self < min
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Low => "low",
            Self::Sd => "sd",
            Self::Hd => "hd",
            Self::FullHd => "full_hd",
            Self::Uhd => "uhd",
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directly playable reference to a unit's current stream.
///
/// Replaced wholesale on every successful resolution, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHandle {
    pub playback_url: String,
    pub quality_tier: QualityTier,
    pub resolved_at: DateTime<Utc>,
}

impl StreamHandle {
    pub fn new(playback_url: impl Into<String>, quality_tier: QualityTier) -> Self {
        Self {
            playback_url: playback_url.into(),
            quality_tier,
            resolved_at: Utc::now(),
        }
    }
}
