//! Native camera and microphone capture
//!
//! nokhwa and cpal device handles are not `Send` on every platform, so each
//! one lives on its own thread and hands data over a channel. The source
//! objects the pipeline sees only hold the receiving end.

use crate::capture::ffmpeg::FfmpegVideoWriter;
use crate::capture::traits::{CaptureBackend, Frame, FrameSource, Resolution, SampleSource, VideoSink};
use crate::config::{AppConfig, AudioFormat};
use crate::utils::{CaptureError, CaptureResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Camera owned by a capture thread
pub struct NokhwaCamera {
    frames: Receiver<CaptureResult<Frame>>,
    resolution: Resolution,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl NokhwaCamera {
    pub fn open(index: u32) -> CaptureResult<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<CaptureResult<Resolution>>();
        let (frame_tx, frame_rx) = mpsc::sync_channel::<CaptureResult<Frame>>(2);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = std::thread::spawn(move || {
            camera_thread(index, ready_tx, frame_tx, thread_running);
        });

        let resolution = match ready_rx.recv() {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::DeviceUnavailable(format!(
                    "camera {} thread exited",
                    index
                )));
            }
        };

        Ok(Self {
            frames: frame_rx,
            resolution,
            running,
            thread: Some(handle),
        })
    }
}

fn camera_thread(
    index: u32,
    ready: mpsc::Sender<CaptureResult<Resolution>>,
    frames: SyncSender<CaptureResult<Frame>>,
    running: Arc<AtomicBool>,
) {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), format) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(CaptureError::DeviceUnavailable(format!(
                "camera {}: {:?}",
                index, e
            ))));
            return;
        }
    };

    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(CaptureError::DeviceUnavailable(format!(
            "camera {} stream: {:?}",
            index, e
        ))));
        return;
    }

    let native = camera.resolution();
    let resolution = Resolution {
        width: native.width(),
        height: native.height(),
    };
    let _ = ready.send(Ok(resolution));

    while running.load(Ordering::Acquire) {
        let frame = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<RgbFormat>())
            .map(|image| Frame {
                resolution: Resolution {
                    width: image.width(),
                    height: image.height(),
                },
                data: image.into_raw(),
            })
            .map_err(|e| CaptureError::DeviceUnavailable(format!("camera {} read: {:?}", index, e)));

        let failed = frame.is_err();
        if frames.send(frame).is_err() || failed {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!("Error stopping camera stream: {:?}", e);
    }
}

impl FrameSource for NokhwaCamera {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn read_frame(&mut self) -> CaptureResult<Frame> {
        self.frames
            .recv()
            .map_err(|_| CaptureError::DeviceUnavailable("camera thread exited".to_string()))?
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        // Dropping the receiver fails any send the thread is parked on
        let (_, closed) = mpsc::sync_channel::<CaptureResult<Frame>>(0);
        drop(std::mem::replace(&mut self.frames, closed));
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Default input device read through a cpal stream
pub struct CpalMicrophone {
    samples: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    chunk_bytes: usize,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CpalMicrophone {
    pub fn open(format: &AudioFormat) -> CaptureResult<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<CaptureResult<()>>();
        let (sample_tx, sample_rx) = mpsc::channel::<Vec<u8>>();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let stream_format = *format;

        let handle = std::thread::spawn(move || {
            microphone_thread(stream_format, ready_tx, sample_tx, thread_running);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::DeviceUnavailable(
                    "microphone thread exited".to_string(),
                ));
            }
        }

        Ok(Self {
            samples: sample_rx,
            pending: Vec::new(),
            chunk_bytes: format.chunk_bytes(),
            running,
            thread: Some(handle),
        })
    }
}

fn microphone_thread(
    format: AudioFormat,
    ready: mpsc::Sender<CaptureResult<()>>,
    samples: mpsc::Sender<Vec<u8>>,
    running: Arc<AtomicBool>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready.send(Err(CaptureError::DeviceUnavailable(
                "no default input device".to_string(),
            )));
            return;
        }
    };

    let stream_config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let bytes: Vec<u8> = data
                .iter()
                .flat_map(|&sample| ((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
                .collect();
            let _ = samples.send(bytes);
        },
        |err| tracing::error!("Microphone stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(CaptureError::DeviceUnavailable(format!(
                "failed to build input stream: {}",
                e
            ))));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready.send(Err(CaptureError::DeviceUnavailable(format!(
            "failed to start input stream: {}",
            e
        ))));
        return;
    }

    let _ = ready.send(Ok(()));
    tracing::info!("Microphone stream started");

    // Keep the stream alive while the source exists
    while running.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    tracing::info!("Microphone stream stopped");
}

impl SampleSource for CpalMicrophone {
    fn read_chunk(&mut self) -> CaptureResult<Vec<u8>> {
        while self.pending.len() < self.chunk_bytes {
            let bytes = self
                .samples
                .recv()
                .map_err(|_| CaptureError::DeviceUnavailable("microphone stream closed".to_string()))?;
            self.pending.extend_from_slice(&bytes);
        }
        let rest = self.pending.split_off(self.chunk_bytes);
        Ok(std::mem::replace(&mut self.pending, rest))
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Native devices with the ffmpeg container writer
pub struct NativeBackend {
    config: AppConfig,
}

impl NativeBackend {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl CaptureBackend for NativeBackend {
    fn open_camera(&self, index: u32) -> CaptureResult<Box<dyn FrameSource>> {
        Ok(Box::new(NokhwaCamera::open(index)?))
    }

    fn open_microphone(&self, format: &AudioFormat) -> CaptureResult<Box<dyn SampleSource>> {
        Ok(Box::new(CpalMicrophone::open(format)?))
    }

    fn open_video_writer(
        &self,
        path: &Path,
        resolution: Resolution,
        fps: f64,
    ) -> CaptureResult<Box<dyn VideoSink>> {
        Ok(Box::new(FfmpegVideoWriter::open(
            &self.config.ffmpeg_path,
            path,
            resolution,
            fps,
        )?))
    }
}
