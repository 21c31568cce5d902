// Ports - Contracts for the native library surface

use crate::domain::convert::{ConversionStats, ConvertRequest};
use crate::error::ConvertResult;
use ffmpeg_next::ffi::{AVCodecID, AVCodecParameters};
use std::ffi::{c_char, c_int, CStr};
use std::path::Path;

/// Port for allocating, releasing and describing native codec parameters
pub trait CodecParametersPort {
    /// Allocate a fresh parameters block. Returns null when out of memory.
    fn allocate(&self) -> *mut AVCodecParameters;

    /// Release a block previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `params` must come from `allocate` on this port and must not have been
    /// released before.
    unsafe fn release(&self, params: *mut AVCodecParameters);

    /// Look up the short codec name for `id`. Returns null when there is no
    /// descriptor for the id. The returned string is owned by the native side
    /// and must stay valid for the life of the process.
    fn codec_name(&self, id: AVCodecID) -> *const c_char;
}

/// Port for the native thumbnail routine
pub trait ThumbnailPort {
    /// Generate a JPEG thumbnail for `input`.
    ///
    /// Returns 0 on success with `out_buf`/`out_size` describing a buffer
    /// owned by the native side. Any other value is a failure.
    fn generate(&self, input: &CStr, out_buf: &mut *mut u8, out_size: &mut usize) -> c_int;

    /// Release a buffer handed out by [`generate`](Self::generate).
    ///
    /// # Safety
    ///
    /// `buf` must come from `generate` on this port and must not have been
    /// released before.
    unsafe fn release_buffer(&self, buf: *mut u8);
}

/// Port for transcoding one media file into another
pub trait ConvertPort {
    /// Re-encode `input` into `output` as described by `request`
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        request: &ConvertRequest,
    ) -> ConvertResult<ConversionStats>;
}
