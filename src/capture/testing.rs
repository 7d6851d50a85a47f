//! In-memory devices for tests

use crate::capture::traits::{CaptureBackend, Frame, FrameSource, Resolution, SampleSource, VideoSink};
use crate::config::AudioFormat;
use crate::export::Muxer;
use crate::utils::{CaptureError, CaptureResult};
use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const FAKE_RESOLUTION: Resolution = Resolution {
    width: 4,
    height: 2,
};

/// Open/close bookkeeping shared between a backend and its handles
#[derive(Debug, Default)]
pub struct DeviceStats {
    pub cameras_open: AtomicUsize,
    pub microphones_open: AtomicUsize,
    pub writers_opened: AtomicUsize,
    pub frames_written: AtomicUsize,
}

impl DeviceStats {
    pub fn cameras_open(&self) -> usize {
        self.cameras_open.load(Ordering::SeqCst)
    }

    pub fn microphones_open(&self) -> usize {
        self.microphones_open.load(Ordering::SeqCst)
    }

    pub fn writers_opened(&self) -> usize {
        self.writers_opened.load(Ordering::SeqCst)
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written.load(Ordering::SeqCst)
    }
}

pub struct FakeCamera {
    stats: Arc<DeviceStats>,
    /// Frames left before reads start failing; `None` streams forever
    remaining: Option<usize>,
    counter: u8,
}

impl FrameSource for FakeCamera {
    fn resolution(&self) -> Resolution {
        FAKE_RESOLUTION
    }

    fn read_frame(&mut self) -> CaptureResult<Frame> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CaptureError::DeviceUnavailable("fake camera unplugged".into()));
            }
            *remaining -= 1;
        }
        std::thread::sleep(Duration::from_millis(1));
        self.counter = self.counter.wrapping_add(1);
        Ok(Frame {
            resolution: FAKE_RESOLUTION,
            data: vec![self.counter; FAKE_RESOLUTION.rgb_frame_size()],
        })
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.stats.cameras_open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct FakeMicrophone {
    stats: Arc<DeviceStats>,
    chunk_bytes: usize,
}

impl SampleSource for FakeMicrophone {
    fn read_chunk(&mut self) -> CaptureResult<Vec<u8>> {
        std::thread::sleep(Duration::from_millis(1));
        Ok(vec![0x11; self.chunk_bytes])
    }
}

impl Drop for FakeMicrophone {
    fn drop(&mut self) {
        self.stats.microphones_open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Writes raw frame bytes to the target path
pub struct FakeSink {
    stats: Arc<DeviceStats>,
    file: File,
    frames: u64,
}

impl VideoSink for FakeSink {
    fn write_frame(&mut self, frame: &Frame) -> CaptureResult<()> {
        self.file.write_all(&frame.data)?;
        self.frames += 1;
        self.stats.frames_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> CaptureResult<u64> {
        self.file.flush()?;
        Ok(self.frames)
    }
}

pub struct FakeBackend {
    pub stats: Arc<DeviceStats>,
    cameras: Vec<u32>,
    microphone: bool,
    writer_fails: bool,
    camera_frames: Option<usize>,
}

impl FakeBackend {
    /// Cameras at the given indices, a working microphone and writer
    pub fn with_cameras(indices: &[u32]) -> Self {
        Self {
            stats: Arc::new(DeviceStats::default()),
            cameras: indices.to_vec(),
            microphone: true,
            writer_fails: false,
            camera_frames: None,
        }
    }

    pub fn without_microphone(mut self) -> Self {
        self.microphone = false;
        self
    }

    pub fn with_failing_writer(mut self) -> Self {
        self.writer_fails = true;
        self
    }

    pub fn with_camera_frames(mut self, frames: usize) -> Self {
        self.camera_frames = Some(frames);
        self
    }
}

impl CaptureBackend for FakeBackend {
    fn open_camera(&self, index: u32) -> CaptureResult<Box<dyn FrameSource>> {
        if !self.cameras.contains(&index) {
            return Err(CaptureError::DeviceUnavailable(format!("no fake camera {}", index)));
        }
        self.stats.cameras_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCamera {
            stats: self.stats.clone(),
            remaining: self.camera_frames,
            counter: 0,
        }))
    }

    fn open_microphone(&self, format: &AudioFormat) -> CaptureResult<Box<dyn SampleSource>> {
        if !self.microphone {
            return Err(CaptureError::DeviceUnavailable("no fake microphone".into()));
        }
        self.stats.microphones_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMicrophone {
            stats: self.stats.clone(),
            chunk_bytes: format.chunk_bytes(),
        }))
    }

    fn open_video_writer(
        &self,
        path: &Path,
        _resolution: Resolution,
        _fps: f64,
    ) -> CaptureResult<Box<dyn VideoSink>> {
        if self.writer_fails {
            return Err(CaptureError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "fake writer refused",
            )));
        }
        let file = File::create(path)?;
        self.stats.writers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSink {
            stats: self.stats.clone(),
            file,
            frames: 0,
        }))
    }
}

/// Muxer that concatenates its inputs, or fails on demand
pub struct FakeMuxer {
    pub succeed: bool,
    pub calls: AtomicUsize,
}

impl FakeMuxer {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> CaptureResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.succeed {
            return Err(CaptureError::MergeUnavailable("fake muxer exited with 1".into()));
        }
        let mut merged = tokio::fs::read(video).await?;
        merged.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}
