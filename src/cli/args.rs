//! Command-line argument definitions

use clap::Args;
use std::path::PathBuf;

use crate::adapters::ThumbnailBackend;

/// Arguments for the params command
#[derive(Args, Debug, Default)]
pub struct ParamsArgs {
    /// Write this bit rate through the raw field view
    #[arg(long)]
    pub bit_rate: Option<i64>,

    /// Write this width through the raw field view
    #[arg(long)]
    pub width: Option<i32>,

    /// Write this height through the raw field view
    #[arg(long)]
    pub height: Option<i32>,

    /// Write this codec (short name, e.g. h264) through the raw field view
    #[arg(long)]
    pub codec: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

impl ParamsArgs {
    /// Whether any field should be written
    pub fn has_updates(&self) -> bool {
        self.bit_rate.is_some() || self.width.is_some() || self.height.is_some() || self.codec.is_some()
    }
}

/// Arguments for the thumbnail command
#[derive(Args, Debug)]
pub struct ThumbnailArgs {
    /// Input media file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output JPEG path
    #[arg(short, long, default_value = "thumbnail.jpg")]
    pub output: PathBuf,

    /// Thumbnail routine to use
    #[arg(short, long, value_enum)]
    pub backend: Option<ThumbnailBackend>,

    /// Maximum thumbnail width
    #[arg(long)]
    pub width: Option<u32>,

    /// Maximum thumbnail height
    #[arg(long)]
    pub height: Option<u32>,

    /// JPEG quality (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Seek offset in seconds before grabbing a frame
    #[arg(short, long)]
    pub seek: Option<f64>,
}

/// Arguments for the convert command
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input media file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file path; the container follows the extension
    #[arg(short, long)]
    pub output: PathBuf,

    /// Video codec short name (default h264)
    #[arg(long)]
    pub video_codec: Option<String>,

    /// Video bit rate in bits per second; below 60 with h264 it is a CRF
    #[arg(long)]
    pub video_bitrate: Option<u32>,

    /// Audio codec short name (default aac)
    #[arg(long)]
    pub audio_codec: Option<String>,

    /// Audio bit rate in bits per second (default 128000)
    #[arg(long)]
    pub audio_bitrate: Option<u32>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
