// TOML config adapter - Configuration loaded from TOML files and environment

use crate::adapters::{LibavCodecParameters, LibavThumbnailer, OsThumbnailer};
use crate::domain::ConvertRequest;
use anyhow::{anyhow, bail, Result};
use anyhow::Context as _;
use ffmpeg_next::codec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Locations searched when no config file is given explicitly
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["avparams.toml", "config/avparams.toml"];

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub thumbnail: ThumbnailSettings,
    pub convert: ConvertSettings,
    pub logging: LoggingSettings,
}

/// Native routine used to produce thumbnails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailBackend {
    /// Decode a frame and encode it with libav
    #[default]
    Libav,
    /// Ask the platform thumbnail service (needs the `os-thumbnail` feature)
    Os,
}

impl FromStr for ThumbnailBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "libav" => Ok(Self::Libav),
            "os" => Ok(Self::Os),
            other => Err(format!("unknown thumbnail backend '{}', expected libav or os", other)),
        }
    }
}

impl std::fmt::Display for ThumbnailBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Libav => write!(f, "libav"),
            Self::Os => write!(f, "os"),
        }
    }
}

/// Thumbnail generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    pub backend: ThumbnailBackend,
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1..=100 (libav backend only)
    pub quality: u8,
    /// Seek offset in seconds (libav backend only)
    pub seek_seconds: f64,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            backend: ThumbnailBackend::Libav,
            max_width: 256,
            max_height: 256,
            quality: 85,
            seek_seconds: 0.0,
        }
    }
}

impl ThumbnailSettings {
    /// Build the libav thumbnailer described by these settings
    pub fn thumbnailer(&self) -> LibavThumbnailer {
        LibavThumbnailer::new(self.max_width, self.max_height)
            .with_quality(self.quality)
            .with_seek(self.seek_seconds)
    }

    /// Build the platform thumbnailer described by these settings
    pub fn os_thumbnailer(&self) -> OsThumbnailer {
        OsThumbnailer::new(self.max_width, self.max_height)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 || self.max_height == 0 {
            bail!(
                "Thumbnail size must be non-zero, got {}x{}",
                self.max_width,
                self.max_height
            );
        }
        if !(1..=100).contains(&self.quality) {
            bail!("Thumbnail quality must be between 1 and 100, got {}", self.quality);
        }
        if !self.seek_seconds.is_finite() || self.seek_seconds < 0.0 {
            bail!("Seek offset must be a non-negative number, got {}", self.seek_seconds);
        }
        Ok(())
    }
}

/// Conversion settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertSettings {
    /// Video codec short name, e.g. `h264`
    pub video_codec: String,
    /// Bits per second; for H.264 a value below 60 is a CRF. 0 keeps the
    /// encoder default.
    pub video_bitrate: u32,
    /// Audio codec short name, e.g. `aac`
    pub audio_codec: String,
    /// Bits per second
    pub audio_bitrate: u32,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            video_bitrate: 0,
            audio_codec: "aac".to_string(),
            audio_bitrate: crate::domain::convert::DEFAULT_AUDIO_BITRATE,
        }
    }
}

impl ConvertSettings {
    /// Resolve codec names and build the conversion request
    pub fn request(&self) -> Result<ConvertRequest> {
        let video = resolve_codec("video", &self.video_codec)?;
        let audio = resolve_codec("audio", &self.audio_codec)?;
        Ok(ConvertRequest::new(video, audio)
            .with_video_bitrate(self.video_bitrate)
            .with_audio_bitrate(self.audio_bitrate))
    }

    /// Check that both codec names are known
    pub fn validate(&self) -> Result<()> {
        self.request().map(|_| ())
    }
}

fn resolve_codec(kind: &str, name: &str) -> Result<codec::Id> {
    LibavCodecParameters::codec_id_by_name(name.trim())
        .map(codec::Id::from)
        .ok_or_else(|| anyhow!("Unknown {} codec: '{}'", kind, name))
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `info` or `avparams_cli=debug`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingSettings {
    /// Check that the level parses as a filter directive
    pub fn validate(&self) -> Result<()> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| anyhow!("Invalid log level '{}': {}", self.level, e))?;
        Ok(())
    }
}

/// TOML configuration adapter
#[derive(Debug, Clone, Default)]
pub struct TomlConfigAdapter {
    config: AppConfig,
    source: Option<PathBuf>,
}

impl TomlConfigAdapter {
    /// Adapter holding the built-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self {
            config,
            source: None,
        })
    }

    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut adapter = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        adapter.source = Some(path.to_path_buf());
        Ok(adapter)
    }

    /// Load `explicit` if given, else the first existing default path, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                bail!("Config file does not exist: {}", path.display());
            }
            return Self::load(path);
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::new())
    }

    /// Apply `AVPARAMS_*` overrides read through `lookup`. Returns how many
    /// variables were applied.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        let config = &mut self.config;

        if let Some(value) = lookup("AVPARAMS_THUMBNAIL_BACKEND") {
            config.thumbnail.backend = parse_env("AVPARAMS_THUMBNAIL_BACKEND", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_THUMBNAIL_WIDTH") {
            config.thumbnail.max_width = parse_env("AVPARAMS_THUMBNAIL_WIDTH", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_THUMBNAIL_HEIGHT") {
            config.thumbnail.max_height = parse_env("AVPARAMS_THUMBNAIL_HEIGHT", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_THUMBNAIL_QUALITY") {
            config.thumbnail.quality = parse_env("AVPARAMS_THUMBNAIL_QUALITY", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_THUMBNAIL_SEEK") {
            config.thumbnail.seek_seconds = parse_env("AVPARAMS_THUMBNAIL_SEEK", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_CONVERT_VIDEO_CODEC") {
            config.convert.video_codec = value;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_CONVERT_VIDEO_BITRATE") {
            config.convert.video_bitrate = parse_env("AVPARAMS_CONVERT_VIDEO_BITRATE", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_CONVERT_AUDIO_CODEC") {
            config.convert.audio_codec = value;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_CONVERT_AUDIO_BITRATE") {
            config.convert.audio_bitrate = parse_env("AVPARAMS_CONVERT_AUDIO_BITRATE", &value)?;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_LOG_LEVEL") {
            config.logging.level = value;
            applied += 1;
        }
        if let Some(value) = lookup("AVPARAMS_LOG_JSON") {
            config.logging.json = parse_env("AVPARAMS_LOG_JSON", &value)?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Get the effective configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the configuration for in-place overrides
    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// Take the configuration out of the adapter
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// File the configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value for {}: '{}' ({})", name, value, e))
}
