//! Configuration initialization and hierarchy management

use anyhow::Result;

use crate::adapters::toml_config::AppConfig;
use crate::adapters::TomlConfigAdapter;
use crate::cli::{Cli, Commands};

/// Where the effective configuration came from, for logging once the
/// subscriber is installed
#[derive(Debug, Clone, Default)]
pub struct ConfigOrigin {
    pub file: Option<String>,
    pub env_overrides: usize,
    pub cli_overrides: usize,
}

/// Build configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> Result<(AppConfig, ConfigOrigin)> {
    initialize_with_env(cli, |key| std::env::var(key).ok())
}

/// Same as [`initialize_configuration_hierarchy`] with an injectable
/// environment lookup
pub fn initialize_with_env<F>(cli: &Cli, lookup: F) -> Result<(AppConfig, ConfigOrigin)>
where
    F: Fn(&str) -> Option<String>,
{
    let mut adapter = TomlConfigAdapter::discover(cli.config.as_deref())?;
    let env_overrides = adapter.apply_env_overrides(lookup)?;
    let file = adapter.source().map(|p| p.display().to_string());

    let mut config = adapter.into_config();
    let cli_overrides = apply_cli_configuration_overrides(&mut config, cli);
    validate_for_command(&config, &cli.command)?;

    Ok((
        config,
        ConfigOrigin {
            file,
            env_overrides,
            cli_overrides,
        },
    ))
}

/// Check logging plus the section the command reads
fn validate_for_command(config: &AppConfig, command: &Commands) -> Result<()> {
    config.logging.validate()?;
    match command {
        Commands::Params(_) => Ok(()),
        Commands::Thumbnail(_) => config.thumbnail.validate(),
        Commands::Convert(_) => config.convert.validate(),
    }
}

/// Apply CLI argument overrides to configuration
fn apply_cli_configuration_overrides(config: &mut AppConfig, cli: &Cli) -> usize {
    let mut cli_overrides = 0;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
        cli_overrides += 1;
    }
    if cli.json_logs {
        config.logging.json = true;
        cli_overrides += 1;
    }

    if let Commands::Thumbnail(args) = &cli.command {
        if let Some(backend) = args.backend {
            config.thumbnail.backend = backend;
            cli_overrides += 1;
        }
        if let Some(width) = args.width {
            config.thumbnail.max_width = width;
            cli_overrides += 1;
        }
        if let Some(height) = args.height {
            config.thumbnail.max_height = height;
            cli_overrides += 1;
        }
        if let Some(quality) = args.quality {
            config.thumbnail.quality = quality;
            cli_overrides += 1;
        }
        if let Some(seek) = args.seek {
            config.thumbnail.seek_seconds = seek;
            cli_overrides += 1;
        }
    }

    if let Commands::Convert(args) = &cli.command {
        if let Some(codec) = &args.video_codec {
            config.convert.video_codec = codec.clone();
            cli_overrides += 1;
        }
        if let Some(bitrate) = args.video_bitrate {
            config.convert.video_bitrate = bitrate;
            cli_overrides += 1;
        }
        if let Some(codec) = &args.audio_codec {
            config.convert.audio_codec = codec.clone();
            cli_overrides += 1;
        }
        if let Some(bitrate) = args.audio_bitrate {
            config.convert.audio_bitrate = bitrate;
            cli_overrides += 1;
        }
    }

    cli_overrides
}
