//! avparams Library
//!
//! Owned handles over libavcodec's `AVCodecParameters`, a JPEG thumbnail
//! extractor and a media converter, all built on ports so the native layer
//! can be swapped out.

pub mod adapters;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use domain::{
    CodecParameters, ConversionStats, ConvertRequest, MediaConverter, ParametersSummary,
    Thumbnail, ThumbnailExtractor,
};
pub use error::{AvParamsError, AvParamsResult, ConvertError, ConvertResult};
pub use ports::{CodecParametersPort, ConvertPort, ThumbnailPort};

/// Initialize the native libraries
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("Failed to initialize FFmpeg: {}", e))?;
    ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
    Ok(())
}
