//! avparams CLI
//!
//! Allocates native codec parameters to show the handle lifecycle, extracts
//! JPEG thumbnails from media files and re-encodes media.
//!
//! # Usage
//!
//! ```bash
//! avparams params
//! avparams params --bit-rate 500000 --width 1280 --height 720 --codec h264
//! avparams thumbnail --input video.mkv --output thumbnail.jpg --width 320
//! avparams convert --input clip.avi --output clip.mp4 --video-bitrate 23
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use avparams_cli::cli::{commands, Cli, Commands};
use avparams_cli::config_initialization::initialize_configuration_hierarchy;
use avparams_cli::utils::init_logging;

/// Main entry point for the avparams CLI
fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, origin) = initialize_configuration_hierarchy(&cli)?;
    init_logging(&config.logging)?;

    match &origin.file {
        Some(file) => info!("Loaded configuration from {}", file),
        None => info!("Using default configuration"),
    }
    if origin.env_overrides > 0 {
        info!("Applied {} environment variable overrides", origin.env_overrides);
    }
    if origin.cli_overrides > 0 {
        info!("Applied {} CLI configuration overrides", origin.cli_overrides);
    }

    avparams_cli::init()?;

    match &cli.command {
        Commands::Params(args) => {
            info!("Executing params command");
            commands::params(args)?;
        }
        Commands::Thumbnail(args) => {
            info!("Executing thumbnail command");
            commands::thumbnail(args, &config.thumbnail)?;
        }
        Commands::Convert(args) => {
            info!("Executing convert command");
            commands::convert(args, &config.convert)?;
        }
    }

    Ok(())
}
