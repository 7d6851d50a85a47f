//! Runtime configuration
//!
//! Everything is defaulted so an empty JSON object (or no file at all)
//! yields a working setup.

use crate::utils::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "GESTURE_CAPTURE_CONFIG";

/// PCM layout of captured audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    /// Sample frames per chunk read by the audio worker
    pub chunk_frames: usize,
}

impl AudioFormat {
    /// Size in bytes of one chunk
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames * self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
            chunk_frames: 1024,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Candidate output roots, first mounted one wins
    pub output_roots: Vec<PathBuf>,

    /// Camera indices probed in order (primary, fallback)
    pub camera_indices: Vec<u32>,

    /// Requested capture width
    pub frame_width: u32,

    /// Requested capture height
    pub frame_height: u32,

    /// Frame rate written into the video container
    pub fps: f64,

    /// Settle time before the single photo frame is read
    pub photo_warmup_ms: u64,

    /// Minimum gap between two photo triggers
    pub photo_cooldown_ms: u64,

    /// Click grouping window for the record toggle gesture
    pub click_timeout_ms: u64,

    /// Pause between video worker iterations
    pub frame_poll_ms: u64,

    pub audio: AudioFormat,

    /// FFmpeg binary used for camera, microphone, writer and merge
    pub ffmpeg_path: String,

    /// FFmpeg demuxer for the camera (`v4l2`, `avfoundation`, `dshow`)
    pub camera_input_format: String,

    /// Camera device string, `{index}` is replaced by the probed index
    pub camera_device_template: String,

    /// FFmpeg demuxer for the microphone
    pub microphone_input_format: String,

    /// Microphone device string
    pub microphone_device: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let (camera_input_format, camera_device_template, microphone_input_format, microphone_device) =
            platform_inputs();
        Self {
            output_roots: Vec::new(),
            camera_indices: vec![0, 1],
            frame_width: 640,
            frame_height: 480,
            fps: 20.0,
            photo_warmup_ms: 500,
            photo_cooldown_ms: 1000,
            click_timeout_ms: 500,
            frame_poll_ms: 10,
            audio: AudioFormat::default(),
            ffmpeg_path: "ffmpeg".to_string(),
            camera_input_format: camera_input_format.to_string(),
            camera_device_template: camera_device_template.to_string(),
            microphone_input_format: microphone_input_format.to_string(),
            microphone_device: microphone_device.to_string(),
        }
    }
}

fn platform_inputs() -> (&'static str, &'static str, &'static str, &'static str) {
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", "{index}", "avfoundation", ":0")
    }

    #[cfg(target_os = "windows")]
    {
        ("dshow", "video={index}", "dshow", "audio=default")
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        ("v4l2", "/dev/video{index}", "alsa", "default")
    }
}

impl AppConfig {
    /// Parse a JSON config file
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CaptureResult<Self> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| CaptureError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `GESTURE_CAPTURE_CONFIG`, else the given argument, else defaults
    pub fn discover(arg: Option<PathBuf>) -> CaptureResult<Self> {
        let path = std::env::var_os(CONFIG_ENV).map(PathBuf::from).or(arg);
        match path {
            Some(path) => {
                tracing::info!("Loading config from {:?}", path);
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> CaptureResult<()> {
        if self.camera_indices.is_empty() {
            return Err(CaptureError::Config("cameraIndices must not be empty".into()));
        }
        if self.fps <= 0.0 {
            return Err(CaptureError::Config("fps must be positive".into()));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(CaptureError::Config("frameWidth and frameHeight must be non-zero".into()));
        }
        if self.audio.bits_per_sample != 16 {
            return Err(CaptureError::Config("only 16-bit audio is supported".into()));
        }
        if self.audio.channels == 0 || self.audio.sample_rate == 0 || self.audio.chunk_frames == 0 {
            return Err(CaptureError::Config(
                "audio channels, sampleRate and chunkFrames must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Device string for a camera index
    pub fn camera_device(&self, index: u32) -> String {
        self.camera_device_template
            .replace("{index}", &index.to_string())
    }

    pub fn photo_warmup(&self) -> Duration {
        Duration::from_millis(self.photo_warmup_ms)
    }

    pub fn photo_cooldown(&self) -> Duration {
        Duration::from_millis(self.photo_cooldown_ms)
    }

    pub fn click_timeout(&self) -> Duration {
        Duration::from_millis(self.click_timeout_ms)
    }

    pub fn frame_poll(&self) -> Duration {
        Duration::from_millis(self.frame_poll_ms)
    }
}
