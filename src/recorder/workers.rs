//! Per-session capture threads
//!
//! Each worker takes ownership of its device handle for the life of the
//! session and gives it back through the join result, so the manager is the
//! only one finishing the writer or closing a device.

use crate::capture::{FrameSource, SampleSource, VideoSink};
use crate::export::AudioBuffer;
use crate::recorder::state::StateCell;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handles returned by the video worker
pub struct VideoWorkerOutput {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn VideoSink>,
    pub frames: u64,
}

/// Handles returned by the audio worker
pub struct AudioWorkerOutput {
    pub source: Box<dyn SampleSource>,
    pub buffer: AudioBuffer,
}

pub fn spawn_video_worker(
    state: StateCell,
    source: Box<dyn FrameSource>,
    sink: Box<dyn VideoSink>,
    poll: Duration,
) -> std::io::Result<JoinHandle<VideoWorkerOutput>> {
    thread::Builder::new()
        .name("video-capture".to_string())
        .spawn(move || run_video(state, source, sink, poll))
}

pub fn spawn_audio_worker(
    state: StateCell,
    source: Box<dyn SampleSource>,
) -> std::io::Result<JoinHandle<AudioWorkerOutput>> {
    thread::Builder::new()
        .name("audio-capture".to_string())
        .spawn(move || run_audio(state, source))
}

fn run_video(
    state: StateCell,
    mut source: Box<dyn FrameSource>,
    mut sink: Box<dyn VideoSink>,
    poll: Duration,
) -> VideoWorkerOutput {
    let mut frames: u64 = 0;
    let started = std::time::Instant::now();

    while state.is_recording() {
        match source.read_frame() {
            Ok(frame) => {
                if let Err(e) = sink.write_frame(&frame) {
                    tracing::warn!("Video writer rejected frame, ending video stream: {}", e);
                    break;
                }
                frames += 1;
            }
            Err(e) => {
                // The session stays Recording; only stop() changes state
                tracing::warn!("Frame read failed, ending video stream early: {}", e);
                break;
            }
        }
        thread::sleep(poll);
    }

    let elapsed = started.elapsed().as_secs_f64();
    tracing::info!(
        "Video worker captured {} frames in {:.2}s ({:.1} fps actual)",
        frames,
        elapsed,
        if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 }
    );

    VideoWorkerOutput {
        source,
        sink,
        frames,
    }
}

fn run_audio(state: StateCell, mut source: Box<dyn SampleSource>) -> AudioWorkerOutput {
    let mut buffer = AudioBuffer::new();

    while state.is_recording() {
        match source.read_chunk() {
            Ok(chunk) => buffer.push(chunk),
            Err(e) => {
                tracing::warn!("Audio read failed, ending audio stream early: {}", e);
                break;
            }
        }
    }

    tracing::info!("Audio worker captured {} chunks", buffer.chunk_count());
    AudioWorkerOutput { source, buffer }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::FakeBackend;
    use crate::capture::CaptureBackend;
    use crate::config::AudioFormat;
    use crate::recorder::state::SessionState;
    use tempfile::tempdir;

    fn recording_state() -> StateCell {
        let state = StateCell::new();
        assert!(state.advance(SessionState::Idle, SessionState::Recording));
        state
    }

    #[test]
    fn test_video_worker_exits_on_stop() {
        let dir = tempdir().unwrap();
        let backend = FakeBackend::with_cameras(&[0]);
        let source = backend.open_camera(0).unwrap();
        let sink = backend
            .open_video_writer(&dir.path().join("v.avi"), source.resolution(), 20.0)
            .unwrap();
        let state = recording_state();

        let handle = spawn_video_worker(state.clone(), source, sink, Duration::from_millis(1)).unwrap();
        thread::sleep(Duration::from_millis(30));
        state.advance(SessionState::Recording, SessionState::Stopping);

        let output = handle.join().unwrap();
        assert!(output.frames > 0);
        assert_eq!(output.frames as usize, backend.stats.frames_written());
    }

    #[test]
    fn test_video_worker_ends_on_read_failure_without_touching_state() {
        let dir = tempdir().unwrap();
        let backend = FakeBackend::with_cameras(&[0]).with_camera_frames(3);
        let source = backend.open_camera(0).unwrap();
        let sink = backend
            .open_video_writer(&dir.path().join("v.avi"), source.resolution(), 20.0)
            .unwrap();
        let state = recording_state();

        let output = spawn_video_worker(state.clone(), source, sink, Duration::from_millis(1))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(output.frames, 3);
        assert_eq!(state.load(), SessionState::Recording);
    }

    #[test]
    fn test_audio_worker_hands_back_buffer() {
        let backend = FakeBackend::with_cameras(&[0]);
        let format = AudioFormat::default();
        let source = backend.open_microphone(&format).unwrap();
        let state = recording_state();

        let handle = spawn_audio_worker(state.clone(), source).unwrap();
        thread::sleep(Duration::from_millis(20));
        state.advance(SessionState::Recording, SessionState::Stopping);

        let output = handle.join().unwrap();
        assert!(!output.buffer.is_empty());
        assert_eq!(output.buffer.byte_len(), output.buffer.chunk_count() * format.chunk_bytes());
        drop(output.source);
        assert_eq!(backend.stats.microphones_open(), 0);
    }
}
