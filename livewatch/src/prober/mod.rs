//! Frame prober.
//!
//! Samples a few frames from a resolved handle and classifies the signal as
//! normal, black, frozen, unreachable or timed out.

mod ffmpeg;
mod frame;
mod service;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

pub use ffmpeg::FfmpegFrameSource;
pub use frame::Frame;
pub use service::FrameProber;

/// Frame-decode capability.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Fetch up to `count` frames from `playback_url` within `timeout`.
    ///
    /// Implementations release every decoder handle and socket before
    /// returning, including on timeout.
    async fn fetch_frames(
        &self,
        playback_url: &str,
        count: u32,
        timeout: Duration,
    ) -> Result<Vec<Frame>, ProbeError>;
}

/// Sampling and classification tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    pub ffmpeg_path: String,
    /// Frames sampled per probe.
    pub sample_count: u32,
    /// Spacing between samples in milliseconds.
    pub sample_interval_ms: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Window for the whole frame fetch.
    pub fetch_timeout_secs: u64,
    /// Mean luma below which a sample is dark.
    pub black_luma_threshold: f64,
    /// Share of lit pixels below which a sample is dark.
    pub min_lit_ratio: f64,
    /// Mean absolute pixel difference at or below which two samples are identical.
    pub freeze_tolerance: f64,
    /// Luma standard deviation below which a lone sample is a flat still.
    pub flat_stddev_threshold: f64,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            sample_count: 3,
            sample_interval_ms: 1000,
            frame_width: 160,
            frame_height: 90,
            fetch_timeout_secs: 20,
            black_luma_threshold: 10.0,
            min_lit_ratio: 0.02,
            freeze_tolerance: 1.0,
            flat_stddev_threshold: 2.0,
        }
    }
}

impl ProberConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_count == 0 {
            return Err(crate::Error::config("prober.sample_count must be at least 1"));
        }
        if self.sample_count > 30 {
            return Err(crate::Error::config("prober.sample_count must be at most 30"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(crate::Error::config("prober frame size must be non-zero"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(crate::Error::config("prober.fetch_timeout_secs must be non-zero"));
        }
        if self.freeze_tolerance < 0.0 || !(0.0..=1.0).contains(&self.min_lit_ratio) {
            return Err(crate::Error::config(
                "prober.freeze_tolerance must be >= 0 and min_lit_ratio within [0, 1]",
            ));
        }
        Ok(())
    }
}
