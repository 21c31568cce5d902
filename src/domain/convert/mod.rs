// Media conversion - Codec and rate-control choices for re-encoding a file

use std::path::Path;

use ffmpeg_next::codec;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapters::LibavConverter;
use crate::error::{ConvertError, ConvertResult};
use crate::ports::ConvertPort;

/// H.264 video bit rates below this are read as a CRF value
pub const CRF_THRESHOLD: u32 = 60;

/// Audio bit rate used when none is requested
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;

/// How the video encoder spends bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    /// Leave rate control to the encoder
    EncoderDefault,
    /// Target bit rate in bits per second
    Bitrate(u32),
    /// Constant rate factor, with the encoder preset picked for it
    Crf { crf: u32, preset: &'static str },
}

/// Encoder preset for a CRF value: slower presets for high quality targets,
/// faster ones for low quality targets
pub fn preset_for_crf(crf: u32) -> &'static str {
    if crf < 18 {
        "slower"
    } else if crf > 30 {
        "faster"
    } else {
        "medium"
    }
}

/// Output codecs and rates for one conversion.
///
/// `codec::Id::None` selects the default codec (H.264 video, AAC audio) and a
/// bit rate of 0 selects the default rate.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertRequest {
    video_codec: codec::Id,
    video_bitrate: u32,
    audio_codec: codec::Id,
    audio_bitrate: u32,
}

impl Default for ConvertRequest {
    fn default() -> Self {
        Self::new(codec::Id::H264, codec::Id::AAC)
    }
}

impl ConvertRequest {
    /// Request with encoder-default rates
    pub fn new(video_codec: codec::Id, audio_codec: codec::Id) -> Self {
        Self {
            video_codec,
            video_bitrate: 0,
            audio_codec,
            audio_bitrate: 0,
        }
    }

    /// Video bit rate in bits per second, or a CRF value below
    /// [`CRF_THRESHOLD`] when the video codec is H.264
    pub fn with_video_bitrate(mut self, bitrate: u32) -> Self {
        self.video_bitrate = bitrate;
        self
    }

    /// Audio bit rate in bits per second
    pub fn with_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    /// Get the video codec, with `None` resolved to H.264
    pub fn video_codec(&self) -> codec::Id {
        match self.video_codec {
            codec::Id::None => codec::Id::H264,
            id => id,
        }
    }

    /// Get the audio codec, with `None` resolved to AAC
    pub fn audio_codec(&self) -> codec::Id {
        match self.audio_codec {
            codec::Id::None => codec::Id::AAC,
            id => id,
        }
    }

    /// Get the requested video bit rate as given
    pub fn video_bitrate(&self) -> u32 {
        self.video_bitrate
    }

    /// Get the audio bit rate, with 0 resolved to [`DEFAULT_AUDIO_BITRATE`]
    pub fn audio_bitrate(&self) -> u32 {
        match self.audio_bitrate {
            0 => DEFAULT_AUDIO_BITRATE,
            bitrate => bitrate,
        }
    }

    /// Rate control for the video encoder
    pub fn rate_control(&self) -> RateControl {
        match self.video_bitrate {
            0 => RateControl::EncoderDefault,
            crf if self.video_codec() == codec::Id::H264 && crf < CRF_THRESHOLD => {
                RateControl::Crf {
                    crf,
                    preset: preset_for_crf(crf),
                }
            }
            bitrate => RateControl::Bitrate(bitrate),
        }
    }
}

/// Counters reported after a conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub bytes_written: u64,
}

impl std::fmt::Display for ConversionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} video frames, {} audio frames, {:.2} MB written",
            self.video_frames,
            self.audio_frames,
            self.bytes_written as f64 / 1024.0 / 1024.0
        )
    }
}

/// Re-encodes media files through a conversion backend
pub struct MediaConverter<P: ConvertPort = LibavConverter> {
    port: P,
}

impl<P: ConvertPort> MediaConverter<P> {
    /// Converter over the given backend
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Get the conversion backend
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Convert `input` into `output`.
    ///
    /// The input must exist and differ from the output. A missing output
    /// directory is created.
    pub fn convert<I: AsRef<Path>, O: AsRef<Path>>(
        &self,
        input: I,
        output: O,
        request: &ConvertRequest,
    ) -> ConvertResult<ConversionStats> {
        let input = input.as_ref();
        let output = output.as_ref();

        if !input.exists() {
            return Err(ConvertError::InputNotFound {
                path: input.display().to_string(),
            });
        }
        if same_file(input, output) {
            return Err(ConvertError::SameFile {
                path: input.display().to_string(),
            });
        }
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating output directory {}", parent.display());
                std::fs::create_dir_all(parent)?;
            }
        }

        info!("Converting {} to {}", input.display(), output.display());
        info!(
            "Video: {:?} ({:?}), audio: {:?} at {} bps",
            request.video_codec(),
            request.rate_control(),
            request.audio_codec(),
            request.audio_bitrate()
        );

        match self.port.convert(input, output, request) {
            Ok(stats) => {
                info!("Conversion finished: {}", stats);
                Ok(stats)
            }
            Err(e) => {
                warn!("Conversion of {} failed: {}", input.display(), e);
                Err(e)
            }
        }
    }
}

fn same_file(input: &Path, output: &Path) -> bool {
    match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    }
}
