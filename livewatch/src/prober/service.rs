//! Probe one handle and classify the sampled frames.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{Frame, FrameSource, ProberConfig};
use crate::domain::{ProbeOutcome, ProbeResult, StreamHandle};
use crate::error::ProbeError;

/// Slack given to a frame source beyond its own fetch window.
const FETCH_GRACE: Duration = Duration::from_secs(2);

pub struct FrameProber {
    source: Arc<dyn FrameSource>,
    config: ProberConfig,
}

impl FrameProber {
    pub fn new(source: Arc<dyn FrameSource>, config: ProberConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ProberConfig {
        &self.config
    }

    /// Probe `handle` on behalf of `unit_id`. Never fails; errors become outcomes.
    pub async fn probe(&self, unit_id: &str, handle: &StreamHandle) -> ProbeResult {
        let started = Instant::now();
        let window = self.config.fetch_timeout();

        let fetched = tokio::time::timeout(
            window + FETCH_GRACE,
            self.source
                .fetch_frames(&handle.playback_url, self.config.sample_count, window),
        )
        .await
        .unwrap_or(Err(ProbeError::Timeout(window)));

        let outcome = match fetched {
            Ok(frames) => self.classify(&frames),
            Err(ProbeError::Timeout(_)) => ProbeOutcome::Timeout,
            Err(ProbeError::Unreachable(reason)) => {
                debug!(unit_id = %unit_id, reason = %reason, "Stream unreachable");
                ProbeOutcome::Unreachable
            }
            Err(ProbeError::DecodeFailure(reason)) => {
                warn!(unit_id = %unit_id, reason = %reason, "Frame decode failed");
                ProbeOutcome::Unreachable
            }
        };

        ProbeResult::new(unit_id, outcome, started.elapsed())
    }

    /// Classify a set of samples.
    pub fn classify(&self, frames: &[Frame]) -> ProbeOutcome {
        if frames.is_empty() {
            return ProbeOutcome::Unreachable;
        }

        if frames.iter().all(|f| self.is_dark(f)) {
            return ProbeOutcome::BlackFrame;
        }

        let frozen = match frames {
            [single] => single.stddev() < self.config.flat_stddev_threshold,
            _ => frames
                .windows(2)
                .all(|pair| pair[0].mean_abs_diff(&pair[1]) <= self.config.freeze_tolerance),
        };
        if frozen {
            return ProbeOutcome::Frozen;
        }

        ProbeOutcome::Ok
    }

    fn is_dark(&self, frame: &Frame) -> bool {
        frame.mean() < self.config.black_luma_threshold
            || frame.lit_ratio() < self.config.min_lit_ratio
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::QualityTier;

    struct StaticSource(Result<Vec<Frame>, ProbeError>);

    #[async_trait]
    impl FrameSource for StaticSource {
        async fn fetch_frames(
            &self,
            _playback_url: &str,
            _count: u32,
            _timeout: Duration,
        ) -> Result<Vec<Frame>, ProbeError> {
            self.0.clone()
        }
    }

    struct HangingSource;

    #[async_trait]
    impl FrameSource for HangingSource {
        async fn fetch_frames(
            &self,
            _playback_url: &str,
            _count: u32,
            _timeout: Duration,
        ) -> Result<Vec<Frame>, ProbeError> {
            std::future::pending().await
        }
    }

    fn prober(result: Result<Vec<Frame>, ProbeError>) -> FrameProber {
        FrameProber::new(Arc::new(StaticSource(result)), ProberConfig::default())
    }

    /// A frame with a gradient so it is neither dark nor flat.
    fn textured(offset: u8) -> Frame {
        let luma = (0..64u32).map(|i| ((i * 3) as u8).wrapping_add(offset)).collect();
        Frame::new(8, 8, luma)
    }

    fn handle() -> StreamHandle {
        StreamHandle::new("https://cdn/live.m3u8", QualityTier::Hd)
    }

    #[test]
    fn test_classify_black() {
        let p = prober(Ok(vec![]));
        let frames = vec![Frame::filled(8, 8, 2), Frame::filled(8, 8, 0)];
        assert_eq!(p.classify(&frames), ProbeOutcome::BlackFrame);
    }

    #[test]
    fn test_one_lit_sample_is_not_black() {
        let p = prober(Ok(vec![]));
        let frames = vec![Frame::filled(8, 8, 0), textured(0)];
        assert_eq!(p.classify(&frames), ProbeOutcome::Ok);
    }

    #[test]
    fn test_classify_frozen() {
        let p = prober(Ok(vec![]));
        let frames = vec![textured(0), textured(0), textured(0)];
        assert_eq!(p.classify(&frames), ProbeOutcome::Frozen);
    }

    #[test]
    fn test_classify_single_flat_sample_frozen() {
        let p = prober(Ok(vec![]));
        assert_eq!(p.classify(&[Frame::filled(8, 8, 128)]), ProbeOutcome::Frozen);
        assert_eq!(p.classify(&[textured(0)]), ProbeOutcome::Ok);
    }

    #[test]
    fn test_classify_moving() {
        let p = prober(Ok(vec![]));
        let frames = vec![textured(0), textured(20), textured(40)];
        assert_eq!(p.classify(&frames), ProbeOutcome::Ok);
    }

    #[tokio::test]
    async fn test_probe_maps_errors() {
        let p = prober(Err(ProbeError::Timeout(Duration::from_secs(1))));
        assert_eq!(p.probe("u1", &handle()).await.outcome, ProbeOutcome::Timeout);

        let p = prober(Err(ProbeError::DecodeFailure("garbage".into())));
        assert_eq!(p.probe("u1", &handle()).await.outcome, ProbeOutcome::Unreachable);

        let p = prober(Ok(vec![]));
        assert_eq!(p.probe("u1", &handle()).await.outcome, ProbeOutcome::Unreachable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_times_out_hanging_source() {
        let config = ProberConfig {
            fetch_timeout_secs: 1,
            ..Default::default()
        };
        let p = FrameProber::new(Arc::new(HangingSource), config);
        let result = p.probe("u1", &handle()).await;
        assert_eq!(result.outcome, ProbeOutcome::Timeout);
        assert_eq!(result.unit_id, "u1");
    }
}
