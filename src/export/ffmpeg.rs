//! FFmpeg audio/video merge
//!
//! Combines the video-only temp container and the WAV temp file into the
//! final `.mp4`. Any launch failure or non-zero exit is reported as
//! `MergeUnavailable` so the caller can fall back to the video-only file.

use crate::utils::{CaptureError, CaptureResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// External tool merging one video and one audio file
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Write `output` from `video` + `audio`; `Ok` only on a clean exit
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> CaptureResult<()>;
}

/// Muxer backed by the `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: String,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Whether `ffmpeg -version` can be launched at all
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }

    /// Arguments for one merge run
    pub fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-strict".to_string(),
            "experimental".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> CaptureResult<()> {
        if !self.is_available().await {
            return Err(CaptureError::MergeUnavailable(format!(
                "{} could not be launched",
                self.program
            )));
        }

        tracing::info!("Merging {:?} + {:?} -> {:?}", video, audio, output);

        let result = Command::new(&self.program)
            .args(Self::merge_args(video, audio, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CaptureError::MergeUnavailable(format!("failed to run {}: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(CaptureError::MergeUnavailable(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
