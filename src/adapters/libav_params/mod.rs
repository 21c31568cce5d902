// LibAV codec parameters adapter - Allocation and descriptor lookup via libavcodec

use crate::ports::CodecParametersPort;
use ffmpeg_next::ffi::{self, AVCodecID, AVCodecParameters};
use std::ffi::{c_char, CString};

/// libavcodec-backed parameters allocator
#[derive(Debug, Default, Clone, Copy)]
pub struct LibavCodecParameters;

impl LibavCodecParameters {
    /// Resolve a codec id from its short name (e.g. `"h264"`)
    pub fn codec_id_by_name(name: &str) -> Option<AVCodecID> {
        let name = CString::new(name).ok()?;
        // SAFETY: `name` is a valid C string for the duration of the call.
        let descriptor = unsafe { ffi::avcodec_descriptor_get_by_name(name.as_ptr()) };
        if descriptor.is_null() {
            return None;
        }
        // SAFETY: descriptors live in a static table inside libavcodec.
        Some(unsafe { (*descriptor).id })
    }
}

impl CodecParametersPort for LibavCodecParameters {
    fn allocate(&self) -> *mut AVCodecParameters {
        unsafe { ffi::avcodec_parameters_alloc() }
    }

    unsafe fn release(&self, params: *mut AVCodecParameters) {
        let mut params = params;
        ffi::avcodec_parameters_free(&mut params);
    }

    fn codec_name(&self, id: AVCodecID) -> *const c_char {
        let descriptor = unsafe { ffi::avcodec_descriptor_get(id) };
        if descriptor.is_null() {
            return std::ptr::null();
        }
        unsafe { (*descriptor).name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CodecParameters;
    use ffmpeg_next::{codec, media};

    #[test]
    fn test_fresh_parameters_have_libav_defaults() {
        let params = CodecParameters::create().unwrap();

        assert_eq!(params.bit_rate(), 0);
        assert_eq!(params.width(), 0);
        assert_eq!(params.height(), 0);
        assert_eq!(params.codec_id(), codec::Id::None);
        assert_eq!(params.codec_type(), media::Type::Unknown);
        assert_eq!(params.format(), -1);
        assert!(params.extradata().is_empty());
    }

    #[test]
    fn test_codec_name_lookup() {
        let mut params = CodecParameters::create().unwrap();
        unsafe {
            params.raw_mut().codec_id = AVCodecID::AV_CODEC_ID_H264;
        }
        assert_eq!(params.codec_name().as_deref(), Some("h264"));
        assert!(params.release());
        assert!(!params.release());
    }

    #[test]
    fn test_codec_id_by_name() {
        assert_eq!(
            LibavCodecParameters::codec_id_by_name("aac"),
            Some(AVCodecID::AV_CODEC_ID_AAC)
        );
        assert_eq!(LibavCodecParameters::codec_id_by_name("not-a-codec"), None);
    }
}
