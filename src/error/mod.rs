//! Error handling module for avparams

use thiserror::Error;

/// Main error type for avparams operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvParamsError {
    /// The native allocator returned no memory
    #[error("Failed to allocate codec parameters")]
    AllocationFailed,

    /// The native thumbnail routine reported a failure, or the path could not
    /// be passed to it
    #[error("Failed to extract thumbnail from {path}{}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    ExtractionFailed { path: String, status: Option<i32> },
}

/// Result type alias for avparams operations
pub type AvParamsResult<T> = std::result::Result<T, AvParamsError>;

/// Errors from media conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: String },

    #[error("Input and output are the same file: {path}")]
    SameFile { path: String },

    #[error("No video stream found in {path}")]
    NoVideoStream { path: String },

    #[error("No encoder available for {codec}")]
    EncoderNotFound { codec: String },

    #[error("Failed to {stage}: {source}")]
    Libav {
        stage: &'static str,
        #[source]
        source: ffmpeg_next::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Wrap a libav error with the step that produced it
    pub fn libav(stage: &'static str) -> impl FnOnce(ffmpeg_next::Error) -> Self {
        move |source| Self::Libav { stage, source }
    }
}

/// Result type alias for conversions
pub type ConvertResult<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_failed_display_includes_status() {
        let err = AvParamsError::ExtractionFailed {
            path: "clip.mp4".to_string(),
            status: Some(-2),
        };
        assert_eq!(err.to_string(), "Failed to extract thumbnail from clip.mp4 (status -2)");
    }

    #[test]
    fn test_extraction_failed_display_without_status() {
        let err = AvParamsError::ExtractionFailed {
            path: "bad\0path".to_string(),
            status: None,
        };
        assert_eq!(err.to_string(), "Failed to extract thumbnail from bad\0path");
    }

    #[test]
    fn test_convert_error_names_the_failed_stage() {
        let err = ConvertError::libav("open input")(ffmpeg_next::Error::InvalidData);
        assert!(err.to_string().starts_with("Failed to open input: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}
