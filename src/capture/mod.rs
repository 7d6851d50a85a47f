//! Camera and microphone capture
//!
//! Frame/sample sources and the video container writer, behind the traits
//! in [`traits`]. The default backend drives ffmpeg subprocesses; the
//! `devices` feature adds native nokhwa/cpal sources.

pub mod ffmpeg;
pub mod traits;

#[cfg(feature = "devices")]
pub mod native;

#[cfg(test)]
pub mod testing;

pub use ffmpeg::FfmpegBackend;
pub use traits::{
    open_first_camera, CaptureBackend, Frame, FrameSource, Resolution, SampleSource, VideoSink,
};

#[cfg(feature = "devices")]
pub use native::NativeBackend;
