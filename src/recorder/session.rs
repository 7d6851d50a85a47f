//! Capture session manager
//!
//! Owns the lifecycle of one recording: opens the devices, runs the video
//! and audio workers, and on stop hands the temp files to the muxer. Falls
//! back to a video-only deliverable when audio or the merge is unavailable.

use crate::capture::{open_first_camera, CaptureBackend};
use crate::config::AppConfig;
use crate::export::{write_wav, AudioBuffer, Muxer};
use crate::recorder::state::{SessionArtifacts, SessionState, StateCell};
use crate::recorder::workers::{
    spawn_audio_worker, spawn_video_worker, AudioWorkerOutput, VideoWorkerOutput,
};
use crate::storage::{ensure_subdir, timestamp, StorageLocator, VIDEO_DIR};
use crate::utils::{CaptureError, CaptureResult};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::runtime::Handle;

/// Threads and paths of the running session
struct ActiveSession {
    artifacts: SessionArtifacts,
    video: JoinHandle<VideoWorkerOutput>,
    audio: Option<JoinHandle<AudioWorkerOutput>>,
    started_at: Instant,
}

/// What became of a stopped session's output
pub enum Finalization {
    /// Video-only output settled during stop
    Settled(PathBuf),

    /// Merge running as a detached task
    Merging {
        task: tokio::task::JoinHandle<PathBuf>,
        /// Reported if the task itself dies
        fallback: PathBuf,
    },
}

impl Finalization {
    /// Wait for the deliverable and return the path left on disk
    pub async fn wait(self) -> PathBuf {
        match self {
            Finalization::Settled(path) => path,
            Finalization::Merging { task, fallback } => match task.await {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!("Merge task failed: {}", e);
                    fallback
                }
            },
        }
    }
}

/// Coordinates one recording session at a time
pub struct SessionManager {
    backend: Arc<dyn CaptureBackend>,
    locator: Arc<dyn StorageLocator>,
    muxer: Arc<dyn Muxer>,
    runtime: Handle,
    config: AppConfig,
    state: StateCell,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn CaptureBackend>,
        locator: Arc<dyn StorageLocator>,
        muxer: Arc<dyn Muxer>,
        runtime: Handle,
    ) -> Self {
        Self {
            backend,
            locator,
            muxer,
            runtime,
            config,
            state: StateCell::new(),
            active: Mutex::new(None),
        }
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Start a session; nothing is left behind on failure
    pub fn start(&self) -> CaptureResult<SessionArtifacts> {
        let mut active = self.active.lock();
        if active.is_some() || self.state.load() != SessionState::Idle {
            return Err(CaptureError::AlreadyRecording);
        }

        let (camera_index, camera) =
            open_first_camera(self.backend.as_ref(), &self.config.camera_indices)?;

        let root = self
            .locator
            .locate_output_root()
            .ok_or(CaptureError::StorageUnavailable)?;
        let video_dir = ensure_subdir(&root, VIDEO_DIR)?;
        let artifacts = SessionArtifacts::allocate(&video_dir, &timestamp(chrono::Local::now()));

        let sink = match self.backend.open_video_writer(
            &artifacts.temp_video,
            camera.resolution(),
            self.config.fps,
        ) {
            Ok(sink) => sink,
            Err(e) => {
                discard_partial(&artifacts, &video_dir);
                return Err(e);
            }
        };

        let microphone = match self.backend.open_microphone(&self.config.audio) {
            Ok(microphone) => Some(microphone),
            Err(e) => {
                tracing::warn!("Microphone unavailable, recording without audio: {}", e);
                None
            }
        };

        if !self.state.advance(SessionState::Idle, SessionState::Recording) {
            drop(sink);
            discard_partial(&artifacts, &video_dir);
            return Err(CaptureError::AlreadyRecording);
        }

        let video = match spawn_video_worker(
            self.state.clone(),
            camera,
            sink,
            self.config.frame_poll(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.state.advance(SessionState::Recording, SessionState::Stopping);
                self.state.advance(SessionState::Stopping, SessionState::Idle);
                discard_partial(&artifacts, &video_dir);
                return Err(e.into());
            }
        };

        let audio = microphone.and_then(|microphone| {
            match spawn_audio_worker(self.state.clone(), microphone) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!("Audio worker failed to start, recording without audio: {}", e);
                    None
                }
            }
        });

        tracing::info!(
            "Recording started (camera {}, audio: {}) -> {:?}",
            camera_index,
            audio.is_some(),
            artifacts.temp_video
        );

        *active = Some(ActiveSession {
            artifacts: artifacts.clone(),
            video,
            audio,
            started_at: Instant::now(),
        });

        Ok(artifacts)
    }

    /// Stop the session; `None` if nothing was recording
    pub fn stop(&self) -> Option<Finalization> {
        let mut active = self.active.lock();
        let session = active.take()?;

        self.state.advance(SessionState::Recording, SessionState::Stopping);
        tracing::info!(
            "Stopping recording after {:.1}s",
            session.started_at.elapsed().as_secs_f64()
        );

        match session.video.join() {
            Ok(output) => {
                tracing::info!("Video worker stopped after {} frames", output.frames);
                drop(output.source);
                match output.sink.finish() {
                    Ok(written) if written != output.frames => tracing::warn!(
                        "Video writer closed with {} frames, worker sent {}",
                        written,
                        output.frames
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Video writer did not close cleanly: {}", e),
                }
            }
            Err(_) => tracing::error!("Video worker panicked"),
        }

        let audio = session.audio.and_then(|handle| match handle.join() {
            Ok(output) => Some(output),
            Err(_) => {
                tracing::error!("Audio worker panicked");
                None
            }
        });

        let finalization = match audio {
            Some(output) => {
                drop(output.source);
                self.finalize_with_audio(session.artifacts, output.buffer)
            }
            None => Finalization::Settled(settle_video_only(&session.artifacts)),
        };

        self.state.advance(SessionState::Stopping, SessionState::Idle);
        Some(finalization)
    }

    fn finalize_with_audio(&self, artifacts: SessionArtifacts, buffer: AudioBuffer) -> Finalization {
        if let Err(e) = write_wav(&buffer, &self.config.audio, &artifacts.temp_audio) {
            tracing::warn!("Audio encode failed, keeping video only: {}", e);
            return Finalization::Settled(settle_video_only(&artifacts));
        }
        drop(buffer);

        let fallback = artifacts.temp_video.clone();
        let muxer = self.muxer.clone();
        let task = self.runtime.spawn(merge_and_clean(muxer, artifacts));
        Finalization::Merging { task, fallback }
    }
}

/// Merge temp files into the final output, falling back to the video alone
async fn merge_and_clean(muxer: Arc<dyn Muxer>, artifacts: SessionArtifacts) -> PathBuf {
    match muxer
        .merge(&artifacts.temp_video, &artifacts.temp_audio, &artifacts.final_output)
        .await
    {
        Ok(()) => {
            for temp in [&artifacts.temp_video, &artifacts.temp_audio] {
                if let Err(e) = tokio::fs::remove_file(temp).await {
                    tracing::warn!("Failed to remove {:?}: {}", temp, e);
                }
            }
            tracing::info!("Recording saved to {:?}", artifacts.final_output);
            artifacts.final_output
        }
        Err(e) => {
            tracing::warn!("{}; keeping video-only output", e);
            match tokio::fs::rename(&artifacts.temp_video, &artifacts.final_output).await {
                Ok(()) => artifacts.final_output,
                Err(e) => {
                    tracing::warn!("Rename to {:?} failed: {}", artifacts.final_output, e);
                    artifacts.temp_video
                }
            }
        }
    }
}

/// Undo a start that failed after storage was prepared
fn discard_partial(artifacts: &SessionArtifacts, video_dir: &Path) {
    if let Err(e) = std::fs::remove_file(&artifacts.temp_video) {
        tracing::debug!("No temp video to remove: {}", e);
    }
    // Only succeeds if no earlier recording lives there
    if std::fs::remove_dir(video_dir).is_ok() {
        tracing::debug!("Removed empty {:?}", video_dir);
    }
}

/// Rename the temp video to the final name; the temp file stays if that fails
pub fn settle_video_only(artifacts: &SessionArtifacts) -> PathBuf {
    match std::fs::rename(&artifacts.temp_video, &artifacts.final_output) {
        Ok(()) => {
            tracing::info!("Video-only recording saved to {:?}", artifacts.final_output);
            artifacts.final_output.clone()
        }
        Err(e) => {
            tracing::warn!(
                "Rename to {:?} failed, leaving {:?}: {}",
                artifacts.final_output,
                artifacts.temp_video,
                e
            );
            artifacts.temp_video.clone()
        }
    }
}
