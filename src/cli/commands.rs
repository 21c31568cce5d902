//! Command implementations

use anyhow::{anyhow, bail, Context, Result};
use ffmpeg_next::ffi::AVCodecID;
use serde::Serialize;
use tracing::{debug, info};

use std::path::{Path, PathBuf};

use crate::adapters::toml_config::{ConvertSettings, ThumbnailSettings};
use crate::adapters::{LibavCodecParameters, LibavConverter, ThumbnailBackend};
use crate::cli::args::{ConvertArgs, ParamsArgs, ThumbnailArgs};
use crate::domain::{
    CodecParameters, ConversionStats, MediaConverter, ParametersSummary, Thumbnail,
    ThumbnailExtractor,
};
use crate::ports::{CodecParametersPort, ThumbnailPort};

/// Before/after snapshots printed by the params command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamsReport {
    pub initial: ParametersSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<ParametersSummary>,
}

impl std::fmt::Display for ParamsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.initial)?;
        if let Some(updated) = &self.updated {
            writeln!(f)?;
            writeln!(f, "Updated Bitrate: {}", updated.bit_rate)?;
            writeln!(f, "Updated Resolution: {} x {}", updated.width, updated.height)?;
            write!(
                f,
                "Updated Codec: {}",
                updated.codec_name.as_deref().unwrap_or("unknown")
            )?;
        }
        Ok(())
    }
}

/// Execute the params command
pub fn params(args: &ParamsArgs) -> Result<()> {
    let codec_id = args
        .codec
        .as_deref()
        .map(|name| {
            LibavCodecParameters::codec_id_by_name(name)
                .ok_or_else(|| anyhow!("Unknown codec: {}", name))
        })
        .transpose()?;

    let mut params = CodecParameters::create().context("Could not create codec parameters")?;
    let report = build_report(&mut params, args, codec_id);
    params.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

/// Snapshot `params`, apply any requested writes, and snapshot again
pub fn build_report<P: CodecParametersPort>(
    params: &mut CodecParameters<P>,
    args: &ParamsArgs,
    codec_id: Option<AVCodecID>,
) -> ParamsReport {
    let initial = params.summary();
    if !args.has_updates() {
        return ParamsReport {
            initial,
            updated: None,
        };
    }

    debug!("Writing fields through the raw parameters view");
    // SAFETY: only plain scalar fields are written; nothing libav frees or
    // cross-checks is touched.
    let raw = unsafe { params.raw_mut() };
    if let Some(bit_rate) = args.bit_rate {
        raw.bit_rate = bit_rate;
    }
    if let Some(width) = args.width {
        raw.width = width;
    }
    if let Some(height) = args.height {
        raw.height = height;
    }
    if let Some(codec_id) = codec_id {
        raw.codec_id = codec_id;
    }

    ParamsReport {
        initial,
        updated: Some(params.summary()),
    }
}

/// Execute the thumbnail command
pub fn thumbnail(args: &ThumbnailArgs, settings: &ThumbnailSettings) -> Result<()> {
    info!("Input: {}", args.input.display());
    info!("Output: {}", args.output.display());

    if !args.input.exists() {
        bail!("Input file does not exist: {}", args.input.display());
    }

    debug!("Thumbnail backend: {}", settings.backend);
    let thumbnail = match settings.backend {
        ThumbnailBackend::Libav => extract_with(settings.thumbnailer(), &args.input)?,
        ThumbnailBackend::Os => extract_os(settings, &args.input)?,
    };

    thumbnail
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("Thumbnail saved to {}", args.output.display());
    Ok(())
}

fn extract_with<P: ThumbnailPort>(port: P, input: &Path) -> Result<Thumbnail> {
    ThumbnailExtractor::new(port)
        .extract(input)
        .with_context(|| format!("Could not create a thumbnail for {}", input.display()))
}

#[cfg(feature = "os-thumbnail")]
fn extract_os(settings: &ThumbnailSettings, input: &Path) -> Result<Thumbnail> {
    extract_with(settings.os_thumbnailer(), input)
}

#[cfg(not(feature = "os-thumbnail"))]
fn extract_os(_settings: &ThumbnailSettings, _input: &Path) -> Result<Thumbnail> {
    bail!("The os thumbnail backend is not available; rebuild with the os-thumbnail feature")
}

/// Result printed by the convert command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub stats: ConversionStats,
}

impl std::fmt::Display for ConvertReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Converted {} to {} ({})",
            self.input.display(),
            self.output.display(),
            self.stats
        )
    }
}

/// Execute the convert command
pub fn convert(args: &ConvertArgs, settings: &ConvertSettings) -> Result<()> {
    info!("Input: {}", args.input.display());
    info!("Output: {}", args.output.display());

    let request = settings.request()?;
    let converter = MediaConverter::new(LibavConverter);
    let stats = converter
        .convert(&args.input, &args.output, &request)
        .with_context(|| format!("Could not convert {}", args.input.display()))?;

    let report = ConvertReport {
        input: args.input.clone(),
        output: args.output.clone(),
        stats,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
