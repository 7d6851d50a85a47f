//! FFmpeg subprocess capture
//!
//! Camera and microphone are read as raw streams from an ffmpeg process's
//! stdout; the video container is written by piping raw frames into
//! another ffmpeg process's stdin.

use crate::capture::traits::{CaptureBackend, Frame, FrameSource, Resolution, SampleSource, VideoSink};
use crate::config::{AppConfig, AudioFormat};
use crate::utils::{CaptureError, CaptureResult};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Read exactly `len` bytes, mapping a closed stream to a device error
fn read_block(stdout: &mut BufReader<ChildStdout>, len: usize, what: &str) -> CaptureResult<Vec<u8>> {
    let mut buffer = vec![0u8; len];
    match stdout.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(CaptureError::DeviceUnavailable(format!("{} stream ended", what)))
        }
        Err(e) => Err(CaptureError::Io(e)),
    }
}

fn stop_process(process: &mut Child) {
    let _ = process.kill();
    let _ = process.wait();
}

/// Camera read through `ffmpeg -f <demuxer> -i <device> -f rawvideo -pix_fmt rgb24 -`
pub struct FfmpegCamera {
    process: Child,
    stdout: BufReader<ChildStdout>,
    resolution: Resolution,
    /// First frame, read while probing the device
    pending: Option<Vec<u8>>,
}

impl FfmpegCamera {
    /// Open a camera; succeeds only once the device has produced a frame
    pub fn open(config: &AppConfig, index: u32) -> CaptureResult<Self> {
        let device = config.camera_device(index);
        let size = format!("{}x{}", config.frame_width, config.frame_height);

        let mut process = Command::new(&config.ffmpeg_path)
            .args([
                "-loglevel",
                "error",
                "-f",
                &config.camera_input_format,
                "-video_size",
                &size,
                "-i",
                &device,
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &size,
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("failed to start ffmpeg for {}: {}", device, e))
            })?;

        let stdout = match process.stdout.take() {
            Some(stdout) => stdout,
            None => {
                stop_process(&mut process);
                return Err(CaptureError::DeviceUnavailable(
                    "failed to capture ffmpeg stdout".to_string(),
                ));
            }
        };

        let resolution = Resolution {
            width: config.frame_width,
            height: config.frame_height,
        };
        let frame_size = resolution.rgb_frame_size();

        let mut camera = Self {
            process,
            stdout: BufReader::with_capacity(frame_size * 2, stdout),
            resolution,
            pending: None,
        };

        // A device that failed to open closes the stream without a frame
        let first = read_block(&mut camera.stdout, frame_size, "camera").map_err(|e| {
            CaptureError::DeviceUnavailable(format!("camera {} produced no frame: {}", device, e))
        })?;
        camera.pending = Some(first);

        tracing::debug!("ffmpeg camera {} streaming {}", device, size);
        Ok(camera)
    }
}

impl FrameSource for FfmpegCamera {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn read_frame(&mut self) -> CaptureResult<Frame> {
        let data = match self.pending.take() {
            Some(data) => data,
            None => read_block(&mut self.stdout, self.resolution.rgb_frame_size(), "camera")?,
        };
        Ok(Frame {
            resolution: self.resolution,
            data,
        })
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        stop_process(&mut self.process);
    }
}

/// Microphone read through `ffmpeg -f <demuxer> -i <device> -f s16le -`
pub struct FfmpegMicrophone {
    process: Child,
    stdout: BufReader<ChildStdout>,
    chunk_bytes: usize,
    pending: Option<Vec<u8>>,
}

impl FfmpegMicrophone {
    pub fn open(config: &AppConfig, format: &AudioFormat) -> CaptureResult<Self> {
        let mut process = Command::new(&config.ffmpeg_path)
            .args([
                "-loglevel",
                "error",
                "-f",
                &config.microphone_input_format,
                "-i",
                &config.microphone_device,
                "-ac",
                &format.channels.to_string(),
                "-ar",
                &format.sample_rate.to_string(),
                "-f",
                "s16le",
                "-acodec",
                "pcm_s16le",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("failed to start ffmpeg microphone: {}", e))
            })?;

        let stdout = match process.stdout.take() {
            Some(stdout) => stdout,
            None => {
                stop_process(&mut process);
                return Err(CaptureError::DeviceUnavailable(
                    "failed to capture ffmpeg stdout".to_string(),
                ));
            }
        };

        let chunk_bytes = format.chunk_bytes();
        let mut microphone = Self {
            process,
            stdout: BufReader::with_capacity(chunk_bytes * 4, stdout),
            chunk_bytes,
            pending: None,
        };

        let first = read_block(&mut microphone.stdout, chunk_bytes, "microphone")?;
        microphone.pending = Some(first);

        tracing::debug!(
            "ffmpeg microphone {} streaming {}Hz {}ch",
            config.microphone_device,
            format.sample_rate,
            format.channels
        );
        Ok(microphone)
    }
}

impl SampleSource for FfmpegMicrophone {
    fn read_chunk(&mut self) -> CaptureResult<Vec<u8>> {
        match self.pending.take() {
            Some(chunk) => Ok(chunk),
            None => read_block(&mut self.stdout, self.chunk_bytes, "microphone"),
        }
    }
}

impl Drop for FfmpegMicrophone {
    fn drop(&mut self) {
        stop_process(&mut self.process);
    }
}

/// XVID `.avi` writer fed with raw RGB24 frames on stdin
pub struct FfmpegVideoWriter {
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    resolution: Resolution,
    frame_count: u64,
}

impl FfmpegVideoWriter {
    pub fn open(ffmpeg: &str, path: &Path, resolution: Resolution, fps: f64) -> CaptureResult<Self> {
        // ffmpeg opens its output only after the first frame arrives
        File::create(path)?;

        let spawned = Command::new(ffmpeg)
            .args([
                "-y",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgb24",
                "-video_size",
                &format!("{}x{}", resolution.width, resolution.height),
                "-framerate",
                &fps.to_string(),
                "-i",
                "-",
                "-c:v",
                "mpeg4",
                "-vtag",
                "xvid",
                "-qscale:v",
                "5",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut process = match spawned {
            Ok(process) => process,
            Err(e) => {
                let _ = std::fs::remove_file(path);
                return Err(CaptureError::Io(e));
            }
        };

        let stdin = process.stdin.take();
        if stdin.is_none() {
            stop_process(&mut process);
            let _ = std::fs::remove_file(path);
            return Err(CaptureError::Io(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "failed to capture ffmpeg stdin",
            )));
        }

        tracing::info!(
            "Started ffmpeg writer: {}x{} @ {}fps, output: {:?}",
            resolution.width,
            resolution.height,
            fps,
            path
        );

        Ok(Self {
            process: Some(process),
            stdin,
            resolution,
            frame_count: 0,
        })
    }
}

impl VideoSink for FfmpegVideoWriter {
    fn write_frame(&mut self, frame: &Frame) -> CaptureResult<()> {
        if frame.data.len() != self.resolution.rgb_frame_size() {
            return Err(CaptureError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "frame is {} bytes, writer expects {}",
                    frame.data.len(),
                    self.resolution.rgb_frame_size()
                ),
            )));
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            CaptureError::Io(std::io::Error::new(ErrorKind::BrokenPipe, "writer closed"))
        })?;
        stdin.write_all(&frame.data)?;
        self.frame_count += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> CaptureResult<u64> {
        // Closing stdin signals EOF
        drop(self.stdin.take());

        if let Some(process) = self.process.take() {
            let output = process.wait_with_output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(CaptureError::Io(std::io::Error::new(
                    ErrorKind::Other,
                    format!("ffmpeg writer exited with {}: {}", output.status, stderr.trim()),
                )));
            }
        }

        tracing::info!("ffmpeg writer finished: {} frames", self.frame_count);
        Ok(self.frame_count)
    }
}

impl Drop for FfmpegVideoWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut process) = self.process.take() {
            stop_process(&mut process);
        }
    }
}

/// Backend driving camera, microphone and writer through ffmpeg
pub struct FfmpegBackend {
    config: AppConfig,
}

impl FfmpegBackend {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl CaptureBackend for FfmpegBackend {
    fn open_camera(&self, index: u32) -> CaptureResult<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegCamera::open(&self.config, index)?))
    }

    fn open_microphone(&self, format: &AudioFormat) -> CaptureResult<Box<dyn SampleSource>> {
        Ok(Box::new(FfmpegMicrophone::open(&self.config, format)?))
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

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_ffmpeg() -> AppConfig {
        AppConfig {
            ffmpeg_path: "/nonexistent/ffmpeg-for-tests".to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_camera_without_ffmpeg_is_unavailable() {
        let result = FfmpegCamera::open(&missing_ffmpeg(), 0);
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_microphone_without_ffmpeg_is_unavailable() {
        let config = missing_ffmpeg();
        let result = FfmpegMicrophone::open(&config, &config.audio);
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }

    #[test]
    fn test_writer_without_ffmpeg_fails_and_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp_video.avi");
        let result = FfmpegVideoWriter::open(
            "/nonexistent/ffmpeg-for-tests",
            &path,
            Resolution {
                width: 4,
                height: 2,
            },
            20.0,
        );
        assert!(matches!(result, Err(CaptureError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_writer_to_unwritable_path_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unplugged").join("temp_video.avi");
        let result = FfmpegVideoWriter::open(
            "ffmpeg",
            &path,
            Resolution {
                width: 4,
                height: 2,
            },
            20.0,
        );
        assert!(matches!(result, Err(CaptureError::Io(_))));
        assert!(!path.exists());
    }
}
