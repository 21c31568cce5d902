//! CLI module for avparams
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod args;
pub mod commands;

pub use args::{ConvertArgs, ParamsArgs, ThumbnailArgs};

/// avparams
///
/// Inspect native codec parameters, extract JPEG thumbnails and re-encode
/// media through libav.
#[derive(Parser, Debug)]
#[command(name = "avparams")]
#[command(about = "Codec parameter handles and native thumbnails over libav")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level or filter directive
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file path
    #[arg(long, global = true, env = "AVPARAMS_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Allocate codec parameters, print them, optionally write fields and print again
    Params(args::ParamsArgs),
    /// Extract a JPEG thumbnail from a media file
    Thumbnail(args::ThumbnailArgs),
    /// Re-encode a media file, by default to H.264 video and AAC audio
    Convert(args::ConvertArgs),
}
