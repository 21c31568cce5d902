// LibAV thumbnail adapter - Native JPEG thumbnails via libavformat/libavcodec/libswscale

use crate::ports::ThumbnailPort;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::{codec, frame, media, Packet, Rational};
use std::ffi::{c_int, c_void, CStr};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// AVERROR(ENOMEM)
const AVERROR_ENOMEM: c_int = -12;

/// Thumbnail generator that decodes one frame and encodes it as MJPEG.
///
/// Output buffers are allocated with `av_malloc` and released with `av_free`.
#[derive(Debug, Clone)]
pub struct LibavThumbnailer {
    max_width: u32,
    max_height: u32,
    quality: u8,
    seek_seconds: f64,
}

impl Default for LibavThumbnailer {
    fn default() -> Self {
        Self::new(256, 256)
    }
}

impl LibavThumbnailer {
    /// Create a thumbnailer that fits output within `max_width` x `max_height`
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: max_width.max(2),
            max_height: max_height.max(2),
            quality: 85,
            seek_seconds: 0.0,
        }
    }

    /// JPEG quality from 1 (worst) to 100 (best)
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Seek this far into the input before decoding
    pub fn with_seek(mut self, seconds: f64) -> Self {
        self.seek_seconds = seconds.max(0.0);
        self
    }

    /// Get the bounding box
    pub fn max_size(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    /// Get the JPEG quality
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Get the seek offset in seconds
    pub fn seek_seconds(&self) -> f64 {
        self.seek_seconds
    }

    /// Decode, scale and encode a thumbnail for `input`
    pub fn render(&self, input: &Path) -> Result<Vec<u8>, ffmpeg::Error> {
        let mut ictx = ffmpeg::format::input(&input)?;

        let (stream_index, mut decoder) = {
            let stream = ictx
                .streams()
                .best(media::Type::Video)
                .ok_or(ffmpeg::Error::StreamNotFound)?;
            let context = codec::context::Context::from_parameters(stream.parameters())?;
            (stream.index(), context.decoder().video()?)
        };

        if self.seek_seconds > 0.0 {
            let ts = (self.seek_seconds * ffi::AV_TIME_BASE as f64) as i64;
            if let Err(e) = ictx.seek(ts, ..ts) {
                debug!("Seek to {}s failed, decoding from start: {}", self.seek_seconds, e);
            }
        }

        let decoded = Self::first_frame(&mut ictx, stream_index, &mut decoder)?;
        let (width, height) = fit_within(
            decoded.width(),
            decoded.height(),
            self.max_width,
            self.max_height,
        );
        debug!(
            "Scaling {}x{} frame to {}x{}",
            decoded.width(),
            decoded.height(),
            width,
            height
        );

        let mut scaler = scaling::Context::get(
            decoded.format(),
            decoded.width(),
            decoded.height(),
            Pixel::YUVJ420P,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;
        let mut scaled = frame::Video::empty();
        scaler.run(&decoded, &mut scaled)?;
        scaled.set_pts(Some(0));

        self.encode_jpeg(&mut scaled, width, height)
    }

    fn first_frame(
        ictx: &mut ffmpeg::format::context::Input,
        stream_index: usize,
        decoder: &mut ffmpeg::decoder::Video,
    ) -> Result<frame::Video, ffmpeg::Error> {
        let mut decoded = frame::Video::empty();

        for (stream, packet) in ictx.packets() {
            if stream.index() != stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            if decoder.receive_frame(&mut decoded).is_ok() {
                return Ok(decoded);
            }
        }

        // Short inputs (single images) may only emit their frame on flush
        decoder.send_eof()?;
        decoder.receive_frame(&mut decoded)?;
        Ok(decoded)
    }

    fn encode_jpeg(
        &self,
        picture: &mut frame::Video,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ffmpeg::Error> {
        let mjpeg = ffmpeg::codec::encoder::find(codec::Id::MJPEG)
            .ok_or(ffmpeg::Error::EncoderNotFound)?;
        let mut encoder = codec::context::Context::new_with_codec(mjpeg)
            .encoder()
            .video()?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUVJ420P);
        encoder.set_time_base(Rational::new(1, 25));

        let qscale = quality_to_qscale(self.quality);
        let lambda = qscale * ffi::FF_QP2LAMBDA as c_int;
        unsafe {
            let ctx = encoder.as_mut_ptr();
            (*ctx).flags |= ffi::AV_CODEC_FLAG_QSCALE as c_int;
            (*ctx).global_quality = lambda;
            (*ctx).qmin = qscale;
            (*ctx).qmax = qscale;
            (*picture.as_mut_ptr()).quality = lambda;
        }

        let mut encoder = encoder.open_as(mjpeg)?;
        encoder.send_frame(picture)?;
        encoder.send_eof()?;

        let mut packet = Packet::empty();
        encoder.receive_packet(&mut packet)?;
        packet
            .data()
            .map(<[u8]>::to_vec)
            .ok_or(ffmpeg::Error::InvalidData)
    }
}

impl ThumbnailPort for LibavThumbnailer {
    fn generate(&self, input: &CStr, out_buf: &mut *mut u8, out_size: &mut usize) -> c_int {
        *out_buf = std::ptr::null_mut();
        *out_size = 0;

        let path = cstr_to_path(input);
        let bytes = match self.render(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Thumbnail generation failed for {}: {}", path.display(), e);
                let status = c_int::from(e);
                return if status == 0 { -1 } else { status };
            }
        };

        // SAFETY: plain allocation; a null result is handled below.
        let buf = unsafe { ffi::av_malloc(bytes.len()) } as *mut u8;
        if buf.is_null() {
            warn!("av_malloc failed for {} byte thumbnail", bytes.len());
            return AVERROR_ENOMEM;
        }
        // SAFETY: `buf` has room for `bytes.len()` bytes and cannot overlap `bytes`.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, bytes.len()) };

        info!("Encoded {} byte JPEG for {}", bytes.len(), path.display());
        *out_buf = buf;
        *out_size = bytes.len();
        0
    }

    unsafe fn release_buffer(&self, buf: *mut u8) {
        ffi::av_free(buf as *mut c_void);
    }
}

/// Largest size within `max_width` x `max_height` that keeps the source
/// aspect ratio. Never upscales; both sides are even and at least 2 because
/// the encoder works in 4:2:0.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    )
    .min(1.0);

    let even = |v: f64| ((v.round() as u32) & !1).max(2);
    (even(width as f64 * scale), even(height as f64 * scale))
}

/// Map a 1..=100 JPEG quality onto the MJPEG qscale range 31..=2
pub fn quality_to_qscale(quality: u8) -> c_int {
    let quality = c_int::from(quality.clamp(1, 100));
    31 - ((quality - 1) * 29 + 49) / 99
}

#[cfg(unix)]
fn cstr_to_path(input: &CStr) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(input.to_bytes()))
}

#[cfg(not(unix))]
fn cstr_to_path(input: &CStr) -> PathBuf {
    PathBuf::from(input.to_string_lossy().into_owned())
}
