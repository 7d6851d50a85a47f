//! Recording state management
//!
//! Defines the session state machine and the per-session artifact paths.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No recording in progress
    Idle = 0,
    /// Workers are capturing
    Recording = 1,
    /// Workers told to exit, output being finalized
    Stopping = 2,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Recording,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }

    /// Only `Idle -> Recording -> Stopping -> Idle` is allowed
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Recording) | (Self::Recording, Self::Stopping) | (Self::Stopping, Self::Idle)
        )
    }
}

/// Session state shared between the manager and its workers
///
/// Writes use release ordering and reads acquire, so a worker polling the
/// cell sees the stop request on its next iteration.
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    inner: Arc<AtomicU8>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn is_recording(&self) -> bool {
        self.load() == SessionState::Recording
    }

    /// Move `from -> to`; false if the cell was not in `from` or the edge is illegal
    pub fn advance(&self, from: SessionState, to: SessionState) -> bool {
        if !from.can_transition_to(to) {
            tracing::error!("Illegal session transition {:?} -> {:?}", from, to);
            return false;
        }
        self.inner
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Paths used by one session, all derived from the same timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionArtifacts {
    /// Video-only container written by the video worker
    pub temp_video: PathBuf,

    /// WAV file encoded from the audio buffer at stop
    pub temp_audio: PathBuf,

    /// Merged (or renamed) deliverable
    pub final_output: PathBuf,
}

impl SessionArtifacts {
    pub fn new(video_dir: &Path, timestamp: &str) -> Self {
        Self {
            temp_video: video_dir.join(format!("temp_video_{}.avi", timestamp)),
            temp_audio: video_dir.join(format!("temp_audio_{}.wav", timestamp)),
            final_output: video_dir.join(format!("monitor_video_{}.mp4", timestamp)),
        }
    }

    /// Paths for `timestamp` that no earlier session has touched
    ///
    /// A session started in the same second as the previous one (whose merge
    /// may still be running) gets a `_1`, `_2`, ... suffix instead.
    pub fn allocate(video_dir: &Path, timestamp: &str) -> Self {
        let mut artifacts = Self::new(video_dir, timestamp);
        let mut suffix = 1u32;
        while artifacts.in_use() {
            artifacts = Self::new(video_dir, &format!("{}_{}", timestamp, suffix));
            suffix += 1;
        }
        artifacts
    }

    fn in_use(&self) -> bool {
        self.temp_video.exists() || self.temp_audio.exists() || self.final_output.exists()
    }
}
