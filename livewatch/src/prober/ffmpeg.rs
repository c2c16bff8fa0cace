//! Frame source backed by the `ffmpeg` binary.

use std::time::Duration;

use async_trait::async_trait;
use process_utils::{RunError, lossy_trimmed, output_with_timeout, tokio_command};
use tracing::{debug, trace};

use super::{Frame, FrameSource, ProberConfig};
use crate::error::ProbeError;

/// Longest stderr excerpt carried in an error.
const STDERR_EXCERPT: usize = 300;

/// Decodes frames by piping `ffmpeg` raw grayscale output.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg_path: String,
    width: u32,
    height: u32,
    sample_interval: Duration,
}

impl FfmpegFrameSource {
    pub fn new(config: &ProberConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            width: config.frame_width,
            height: config.frame_height,
            sample_interval: Duration::from_millis(config.sample_interval_ms.max(1)),
        }
    }

    fn build_args(&self, playback_url: &str, count: u32) -> Vec<String> {
        let fps = 1.0 / self.sample_interval.as_secs_f64();
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            playback_url.to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("fps={fps:.4},scale={}:{}", self.width, self.height),
            "-frames:v".to_string(),
            count.to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "gray".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn fetch_frames(
        &self,
        playback_url: &str,
        count: u32,
        timeout: Duration,
    ) -> Result<Vec<Frame>, ProbeError> {
        let args = self.build_args(playback_url, count);
        trace!(args = ?args, "Running ffmpeg");

        let mut cmd = tokio_command(&self.ffmpeg_path);
        cmd.args(&args);

        let output = output_with_timeout(cmd, timeout).await.map_err(|e| match e {
            RunError::TimedOut(d) => ProbeError::Timeout(d),
            RunError::Spawn(err) => {
                ProbeError::DecodeFailure(format!("cannot run {}: {err}", self.ffmpeg_path))
            }
            RunError::Io(err) => ProbeError::Unreachable(err.to_string()),
        })?;

        let frames = Frame::split_raw(self.width, self.height, &output.stdout);
        if frames.is_empty() {
            let stderr = lossy_trimmed(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return if output.stdout.is_empty() {
                Err(ProbeError::Unreachable(excerpt))
            } else {
                Err(ProbeError::DecodeFailure(format!(
                    "{} bytes is not a whole {}x{} frame",
                    output.stdout.len(),
                    self.width,
                    self.height
                )))
            };
        }

        debug!(frames = frames.len(), "ffmpeg sampled frames");
        Ok(frames)
    }
}
