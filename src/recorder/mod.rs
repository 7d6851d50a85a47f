//! Recording system module
//!
//! - SessionManager: one audio/video session at a time
//! - Capture workers for the video and audio streams
//! - PhotoCapturer for single frames outside any session

pub mod photo;
pub mod session;
pub mod state;
pub mod workers;

pub use photo::{CaptureLatch, PhotoCapturer};
pub use session::{settle_video_only, Finalization, SessionManager};
pub use state::{SessionArtifacts, SessionState, StateCell};
