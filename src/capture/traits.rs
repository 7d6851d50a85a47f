//! Capture trait definitions
//!
//! Device-agnostic seams for frame sources, sample sources and the video
//! container writer. Handles are moved between threads, never shared.

use crate::config::AudioFormat;
use crate::utils::{CaptureError, CaptureResult};
use std::path::Path;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Bytes in one RGB24 frame
    pub fn rgb_frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// One RGB24 video frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub resolution: Resolution,
    pub data: Vec<u8>,
}

/// Blocking provider of video frames (a camera)
pub trait FrameSource: Send {
    /// Resolution of frames returned by `read_frame`
    fn resolution(&self) -> Resolution;

    /// Block until the next frame is available
    fn read_frame(&mut self) -> CaptureResult<Frame>;
}

/// Blocking provider of PCM sample chunks (a microphone)
pub trait SampleSource: Send {
    /// Block until one fixed-size chunk of interleaved little-endian samples is available
    fn read_chunk(&mut self) -> CaptureResult<Vec<u8>>;
}

/// Open video container being appended to
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> CaptureResult<()>;

    /// Flush and close the container, returning the number of frames written
    fn finish(self: Box<Self>) -> CaptureResult<u64>;
}

/// Factory for device handles and writers
pub trait CaptureBackend: Send + Sync {
    fn open_camera(&self, index: u32) -> CaptureResult<Box<dyn FrameSource>>;

    fn open_microphone(&self, format: &AudioFormat) -> CaptureResult<Box<dyn SampleSource>>;

    fn open_video_writer(
        &self,
        path: &Path,
        resolution: Resolution,
        fps: f64,
    ) -> CaptureResult<Box<dyn VideoSink>>;
}

/// Open the first camera that responds, in probe order
pub fn open_first_camera(
    backend: &dyn CaptureBackend,
    indices: &[u32],
) -> CaptureResult<(u32, Box<dyn FrameSource>)> {
    for &index in indices {
        match backend.open_camera(index) {
            Ok(source) => {
                tracing::info!("Camera {} opened", index);
                return Ok((index, source));
            }
            Err(e) => {
                tracing::debug!("Camera {} unavailable: {}", index, e);
            }
        }
    }

    Err(CaptureError::DeviceUnavailable(format!(
        "no camera opened (tried {:?})",
        indices
    )))
}
