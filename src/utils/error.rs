//! Error types and handling
//!
//! Common error types used across the capture pipeline.

use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No output location available")]
    StorageUnavailable,

    #[error("Merge unavailable: {0}")]
    MergeUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio encode error: {0}")]
    AudioEncode(#[from] hound::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("A recording session is already active")]
    AlreadyRecording,

    #[error("A photo capture is already in progress")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    /// Stable code attached to log records as the `code` field
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            CaptureError::StorageUnavailable => "STORAGE_UNAVAILABLE",
            CaptureError::MergeUnavailable(_) => "MERGE_UNAVAILABLE",
            CaptureError::Io(_) => "IO_ERROR",
            CaptureError::AudioEncode(_) => "AUDIO_ENCODE_ERROR",
            CaptureError::Image(_) => "IMAGE_ERROR",
            CaptureError::AlreadyRecording => "ALREADY_RECORDING",
            CaptureError::Busy => "BUSY",
            CaptureError::Config(_) => "CONFIG_ERROR",
        }
    }
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_variant() {
        let errors = [
            CaptureError::DeviceUnavailable("camera 0".into()),
            CaptureError::StorageUnavailable,
            CaptureError::MergeUnavailable("exit 1".into()),
            CaptureError::AlreadyRecording,
            CaptureError::Busy,
            CaptureError::Config("fps".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(CaptureError::code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert_eq!(errors[0].code(), "DEVICE_UNAVAILABLE");
    }

    #[test]
    fn test_io_error_converts() {
        let err: CaptureError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.code(), "IO_ERROR");
    }
}
