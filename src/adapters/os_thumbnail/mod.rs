// OS thumbnail adapter - Bindings for the platform thumbnail library
//
// LoadOSThumbnailJPEGBuffer asks the platform (Windows Shell, QuickLook, the
// freedesktop thumbnail cache) for a JPEG no larger than width x height. It
// returns 1 on success and 0 on failure. The buffer comes from the platform
// allocator: CoTaskMemFree on Windows, free on macOS, g_free elsewhere.

use std::ffi::c_int;

/// Status reported to the extractor when the platform gives no thumbnail
pub const OS_THUMBNAIL_FAILED: c_int = -1;

/// Thumbnail port backed by the native `os_thumbnail` library.
///
/// Only implements [`ThumbnailPort`](crate::ports::ThumbnailPort) in builds
/// with the `os-thumbnail` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsThumbnailer {
    width: c_int,
    height: c_int,
}

impl OsThumbnailer {
    /// Thumbnailer asking for images within `max_width` x `max_height`
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            width: c_int::try_from(max_width).unwrap_or(c_int::MAX),
            height: c_int::try_from(max_height).unwrap_or(c_int::MAX),
        }
    }

    /// Get the requested bounding box
    pub fn size(&self) -> (c_int, c_int) {
        (self.width, self.height)
    }
}

/// Map the library's success flag (non-zero on success) onto the port's
/// status convention (0 on success)
pub fn status_from_flag(flag: c_int) -> c_int {
    if flag != 0 {
        0
    } else {
        OS_THUMBNAIL_FAILED
    }
}

#[cfg(feature = "os-thumbnail")]
mod native {
    use std::ffi::{c_char, c_int, c_void};

    #[link(name = "os_thumbnail")]
    extern "C" {
        #[allow(non_snake_case)]
        pub fn LoadOSThumbnailJPEGBuffer(
            file_path: *const c_char,
            width: c_int,
            height: c_int,
            jpeg_buffer: *mut *mut u8,
            jpeg_size: *mut usize,
        ) -> c_int;
    }

    #[cfg(windows)]
    #[link(name = "ole32")]
    extern "system" {
        fn CoTaskMemFree(pv: *mut c_void);
    }

    #[cfg(target_os = "macos")]
    extern "C" {
        fn free(ptr: *mut c_void);
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    #[link(name = "glib-2.0")]
    extern "C" {
        fn g_free(mem: *mut c_void);
    }

    /// # Safety
    /// `buf` must come from `LoadOSThumbnailJPEGBuffer` and not be freed yet.
    pub unsafe fn free_buffer(buf: *mut u8) {
        #[cfg(windows)]
        CoTaskMemFree(buf.cast());
        #[cfg(target_os = "macos")]
        free(buf.cast());
        #[cfg(not(any(windows, target_os = "macos")))]
        g_free(buf.cast());
    }
}

#[cfg(feature = "os-thumbnail")]
impl crate::ports::ThumbnailPort for OsThumbnailer {
    fn generate(&self, input: &std::ffi::CStr, out_buf: &mut *mut u8, out_size: &mut usize) -> c_int {
        *out_buf = std::ptr::null_mut();
        *out_size = 0;
        // SAFETY: `input` is a valid C string and both out-pointers are live
        // for the duration of the call.
        let flag = unsafe {
            native::LoadOSThumbnailJPEGBuffer(input.as_ptr(), self.width, self.height, out_buf, out_size)
        };
        let status = status_from_flag(flag);
        if status != 0 {
            tracing::debug!("Platform thumbnail service returned no image for {:?}", input);
        }
        status
    }

    unsafe fn release_buffer(&self, buf: *mut u8) {
        native::free_buffer(buf);
    }
}
