//! Session output finishing
//!
//! WAV encoding of the captured audio and the ffmpeg merge of the temp
//! video and audio files into the final container.

pub mod ffmpeg;
pub mod wav;

pub use ffmpeg::{FfmpegMuxer, Muxer};
pub use wav::{write_wav, AudioBuffer};
