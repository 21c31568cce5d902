// Codec parameters handle - Owned wrapper over a native AVCodecParameters block

use std::cell::Cell;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, Ordering};

use ffmpeg_next::ffi::{AVChannelOrder, AVCodecParameters, AVFieldOrder};
use ffmpeg_next::{chroma, codec, color, media, Rational};
use serde::Serialize;
use tracing::{debug, trace};

use crate::adapters::LibavCodecParameters;
use crate::error::{AvParamsError, AvParamsResult};
use crate::ports::CodecParametersPort;

/// Handle owning one natively allocated `AVCodecParameters`.
///
/// The block is released exactly once: by [`close`](Self::close),
/// [`release`](Self::release) or when the handle is dropped, whichever comes
/// first. The pointer doubles as the one-shot guard: releasing swaps it to
/// null and only the caller that observed the live pointer frees it.
///
/// Accessors return owned values so nothing borrowed from native memory can
/// outlive a release. The handle is not `Sync`; reads do not synchronize with
/// `release`.
pub struct CodecParameters<P: CodecParametersPort = LibavCodecParameters> {
    ptr: AtomicPtr<AVCodecParameters>,
    port: P,
    _not_sync: PhantomData<Cell<()>>,
}

impl CodecParameters<LibavCodecParameters> {
    /// Allocate codec parameters through libavcodec
    pub fn create() -> AvParamsResult<Self> {
        Self::with_port(LibavCodecParameters)
    }
}

impl<P: CodecParametersPort> CodecParameters<P> {
    /// Allocate codec parameters through `port`
    pub fn with_port(port: P) -> AvParamsResult<Self> {
        let ptr = port.allocate();
        if ptr.is_null() {
            debug!("Native allocator returned no memory for codec parameters");
            return Err(AvParamsError::AllocationFailed);
        }

        trace!("Allocated codec parameters at {:p}", ptr);
        Ok(Self {
            ptr: AtomicPtr::new(ptr),
            port,
            _not_sync: PhantomData,
        })
    }

    /// Release the native block now. Returns `true` if this call freed it,
    /// `false` if it had already been released.
    pub fn release(&self) -> bool {
        let ptr = self.ptr.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if ptr.is_null() {
            return false;
        }

        trace!("Releasing codec parameters at {:p}", ptr);
        // SAFETY: `ptr` came from `allocate` on this port, and the swap above
        // guarantees no other caller observed it as live.
        unsafe { self.port.release(ptr) };
        true
    }

    /// Release the native block and consume the handle
    pub fn close(self) {
        self.release();
    }

    /// Whether the native block is still owned by this handle
    pub fn is_live(&self) -> bool {
        !self.ptr.load(Ordering::Acquire).is_null()
    }

    /// Raw pointer to the native block, or null after release.
    ///
    /// The pointer is only valid while the handle is alive and unreleased.
    pub fn as_ptr(&self) -> *const AVCodecParameters {
        self.ptr.load(Ordering::Acquire)
    }

    /// Mutable view straight onto the native fields.
    ///
    /// # Safety
    ///
    /// Writes bypass any validation libav would perform. The caller must keep
    /// the block consistent with what libav expects; in particular
    /// `extradata` must be allocated with `av_malloc` and padded, because
    /// libav frees it on release.
    ///
    /// # Panics
    ///
    /// Panics if the handle has been released.
    pub unsafe fn raw_mut(&mut self) -> &mut AVCodecParameters {
        let ptr = *self.ptr.get_mut();
        assert!(!ptr.is_null(), "codec parameters accessed after release");
        &mut *ptr
    }

    fn params(&self) -> &AVCodecParameters {
        let ptr = self.ptr.load(Ordering::Acquire);
        assert!(!ptr.is_null(), "codec parameters accessed after release");
        // SAFETY: a non-null pointer is live until `release` swaps it out, and
        // `release` cannot run while this borrow is in use on another thread.
        unsafe { &*ptr }
    }

    /// Get the average bit rate in bits per second
    pub fn bit_rate(&self) -> i64 {
        self.params().bit_rate
    }

    /// Get the frame width in pixels
    pub fn width(&self) -> i32 {
        self.params().width
    }

    /// Get the frame height in pixels
    pub fn height(&self) -> i32 {
        self.params().height
    }

    /// Get the codec id
    pub fn codec_id(&self) -> codec::Id {
        codec::Id::from(self.params().codec_id)
    }

    /// Get the media type (video, audio, ...)
    pub fn codec_type(&self) -> media::Type {
        media::Type::from(self.params().codec_type)
    }

    /// Short codec name from the native descriptor table, if the codec id has one
    pub fn codec_name(&self) -> Option<String> {
        let name = self.port.codec_name(self.params().codec_id);
        if name.is_null() {
            return None;
        }

        // SAFETY: the port contract says a non-null name is a static C string.
        Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    /// Get the container fourcc tag
    pub fn codec_tag(&self) -> u32 {
        self.params().codec_tag
    }

    /// Pixel or sample format as the raw libav enum value (-1 when unset)
    pub fn format(&self) -> i32 {
        self.params().format
    }

    /// Get the bits per sample in the coded stream
    pub fn bits_per_coded_sample(&self) -> i32 {
        self.params().bits_per_coded_sample
    }

    /// Get the bits per sample before encoding
    pub fn bits_per_raw_sample(&self) -> i32 {
        self.params().bits_per_raw_sample
    }

    /// Get the codec profile
    pub fn profile(&self) -> i32 {
        self.params().profile
    }

    /// Get the codec level
    pub fn level(&self) -> i32 {
        self.params().level
    }

    /// Get the sample aspect ratio
    pub fn sample_aspect_ratio(&self) -> Rational {
        Rational::from(self.params().sample_aspect_ratio)
    }

    /// Get the frame rate
    pub fn frame_rate(&self) -> Rational {
        Rational::from(self.params().framerate)
    }

    /// Get the interlacing field order
    pub fn field_order(&self) -> AVFieldOrder {
        self.params().field_order
    }

    /// Get the color range
    pub fn color_range(&self) -> color::Range {
        color::Range::from(self.params().color_range)
    }

    /// Get the color primaries
    pub fn color_primaries(&self) -> color::Primaries {
        color::Primaries::from(self.params().color_primaries)
    }

    /// Get the color transfer characteristic
    pub fn color_transfer_characteristic(&self) -> color::TransferCharacteristic {
        color::TransferCharacteristic::from(self.params().color_trc)
    }

    /// Get the YUV color space
    pub fn color_space(&self) -> color::Space {
        color::Space::from(self.params().color_space)
    }

    /// Get the chroma sample location
    pub fn chroma_location(&self) -> chroma::Location {
        chroma::Location::from(self.params().chroma_location)
    }

    /// Get the number of delayed frames
    pub fn video_delay(&self) -> i32 {
        self.params().video_delay
    }

    /// Get the audio sample rate in Hz
    pub fn sample_rate(&self) -> i32 {
        self.params().sample_rate
    }

    /// Get the number of audio channels
    pub fn channels(&self) -> i32 {
        self.params().ch_layout.nb_channels
    }

    /// Channel bitmask, only defined for native-order layouts
    pub fn channel_mask(&self) -> Option<u64> {
        let layout = &self.params().ch_layout;
        if layout.order != AVChannelOrder::AV_CHANNEL_ORDER_NATIVE {
            return None;
        }

        // SAFETY: `mask` is the active union member for native-order layouts.
        Some(unsafe { layout.u.mask })
    }

    /// Get the audio block size in bytes
    pub fn block_align(&self) -> i32 {
        self.params().block_align
    }

    /// Get the audio frame size in samples
    pub fn frame_size(&self) -> i32 {
        self.params().frame_size
    }

    /// Get the priming samples at the start of the stream
    pub fn initial_padding(&self) -> i32 {
        self.params().initial_padding
    }

    /// Get the padding samples at the end of the stream
    pub fn trailing_padding(&self) -> i32 {
        self.params().trailing_padding
    }

    /// Get the samples to discard after a seek
    pub fn seek_preroll(&self) -> i32 {
        self.params().seek_preroll
    }

    /// Copy of the codec-specific extradata
    pub fn extradata(&self) -> Vec<u8> {
        let params = self.params();
        if params.extradata.is_null() || params.extradata_size <= 0 {
            return Vec::new();
        }

        // SAFETY: libav keeps `extradata_size` bytes behind a non-null `extradata`.
        unsafe { std::slice::from_raw_parts(params.extradata, params.extradata_size as usize) }
            .to_vec()
    }

    /// Snapshot of the commonly printed fields
    pub fn summary(&self) -> ParametersSummary {
        ParametersSummary {
            bit_rate: self.bit_rate(),
            width: self.width(),
            height: self.height(),
            codec_id: format!("{:?}", self.codec_id()),
            codec_name: self.codec_name(),
            codec_type: format!("{:?}", self.codec_type()),
            sample_rate: self.sample_rate(),
            channels: self.channels(),
        }
    }
}

impl<P: CodecParametersPort> Drop for CodecParameters<P> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<P: CodecParametersPort> std::fmt::Debug for CodecParameters<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecParameters")
            .field("ptr", &self.as_ptr())
            .finish_non_exhaustive()
    }
}

/// Printable snapshot of a parameters block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametersSummary {
    pub bit_rate: i64,
    pub width: i32,
    pub height: i32,
    pub codec_id: String,
    pub codec_name: Option<String>,
    pub codec_type: String,
    pub sample_rate: i32,
    pub channels: i32,
}

impl std::fmt::Display for ParametersSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Bitrate: {}", self.bit_rate)?;
        writeln!(f, "Resolution: {} x {}", self.width, self.height)?;
        write!(
            f,
            "Codec: {}",
            self.codec_name.as_deref().unwrap_or("unknown")
        )
    }
}
