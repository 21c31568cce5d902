// Adapters - Native library implementations of the ports

pub mod libav_convert;
pub mod libav_params;
pub mod libav_thumbnail;
pub mod os_thumbnail;
pub mod toml_config;

// Re-export adapters
pub use libav_convert::LibavConverter;
pub use libav_params::LibavCodecParameters;
pub use libav_thumbnail::LibavThumbnailer;
pub use os_thumbnail::OsThumbnailer;
pub use toml_config::{ThumbnailBackend, TomlConfigAdapter};
