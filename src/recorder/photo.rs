//! Single-shot photo capture
//!
//! Independent of the session manager. The `capturing` latch keeps two
//! photos (or a photo and a session start) from holding the camera at once.

use crate::capture::{open_first_camera, CaptureBackend, Frame};
use crate::storage::{ensure_subdir, timestamp, StorageLocator, PHOTO_DIR};
use crate::utils::{CaptureError, CaptureResult};
use chrono::Local;
use image::{ImageFormat, RgbImage};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Held while a capture is in flight; releases the latch on drop
#[derive(Debug)]
pub struct CaptureLatch {
    flag: Arc<AtomicBool>,
}

impl Drop for CaptureLatch {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct PhotoCapturer {
    backend: Arc<dyn CaptureBackend>,
    locator: Arc<dyn StorageLocator>,
    camera_indices: Vec<u32>,
    warmup: Duration,
    capturing: Arc<AtomicBool>,
    last_capture: Mutex<Option<Instant>>,
}

impl PhotoCapturer {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        locator: Arc<dyn StorageLocator>,
        camera_indices: Vec<u32>,
        warmup: Duration,
    ) -> Self {
        Self {
            backend,
            locator,
            camera_indices,
            warmup,
            capturing: Arc::new(AtomicBool::new(false)),
            last_capture: Mutex::new(None),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    /// When the last photo was actually written; failed attempts leave it alone
    pub fn last_capture(&self) -> Option<Instant> {
        *self.last_capture.lock()
    }

    /// Take the latch, `Busy` if another capture holds it
    pub fn begin(&self) -> CaptureResult<CaptureLatch> {
        self.capturing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CaptureError::Busy)?;
        Ok(CaptureLatch {
            flag: self.capturing.clone(),
        })
    }

    /// Take the latch and capture
    pub fn capture_photo(&self) -> CaptureResult<PathBuf> {
        let latch = self.begin()?;
        self.capture_with(latch)
    }

    /// Capture under a latch taken earlier with [`begin`](Self::begin)
    pub fn capture_with(&self, latch: CaptureLatch) -> CaptureResult<PathBuf> {
        let frame = self.grab_frame()?;

        let root = self
            .locator
            .locate_output_root()
            .ok_or(CaptureError::StorageUnavailable)?;
        let dir = ensure_subdir(&root, PHOTO_DIR)?;

        let path = dir.join(format!("monitor_photo_{}.jpg", timestamp(Local::now())));
        save_jpeg(&frame, &path)?;

        *self.last_capture.lock() = Some(Instant::now());
        drop(latch);

        tracing::info!("Photo saved to {:?}", path);
        Ok(path)
    }

    /// Open, settle, read one frame; the camera is released before returning
    fn grab_frame(&self) -> CaptureResult<Frame> {
        let (index, mut camera) = open_first_camera(self.backend.as_ref(), &self.camera_indices)?;
        std::thread::sleep(self.warmup);
        let frame = camera.read_frame();
        drop(camera);
        tracing::debug!("Camera {} released after photo grab", index);
        frame
    }
}

fn save_jpeg(frame: &Frame, path: &Path) -> CaptureResult<()> {
    let image = RgbImage::from_raw(
        frame.resolution.width,
        frame.resolution.height,
        frame.data.clone(),
    )
    .ok_or_else(|| {
        CaptureError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "frame is {} bytes, expected {} for {}x{}",
                frame.data.len(),
                frame.resolution.rgb_frame_size(),
                frame.resolution.width,
                frame.resolution.height
            ),
        ))
    })?;
    image.save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}
