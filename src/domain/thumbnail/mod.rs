// Thumbnail extraction - Copy native JPEG output into caller-owned bytes

use std::ffi::CString;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::adapters::LibavThumbnailer;
use crate::error::{AvParamsError, AvParamsResult};
use crate::ports::ThumbnailPort;

/// JPEG start-of-image marker
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG bytes owned by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    bytes: Vec<u8>,
}

impl Thumbnail {
    /// Get the encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the encoded bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Get the size in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the image has no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the bytes start with a JPEG SOI marker
    pub fn is_jpeg(&self) -> bool {
        self.bytes.starts_with(&JPEG_SOI)
    }

    /// Write the image to `path`
    pub fn save<Q: AsRef<Path>>(&self, path: Q) -> std::io::Result<()> {
        std::fs::write(path, &self.bytes)
    }
}

/// Native buffer that is released when the guard goes out of scope
struct ForeignBuffer<'a, P: ThumbnailPort> {
    port: &'a P,
    ptr: *mut u8,
}

impl<P: ThumbnailPort> Drop for ForeignBuffer<'_, P> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: `ptr` was produced by `generate` on this port and the
            // guard is the only owner.
            unsafe { self.port.release_buffer(self.ptr) };
        }
    }
}

/// Extracts JPEG thumbnails through a native thumbnail routine
pub struct ThumbnailExtractor<P: ThumbnailPort = LibavThumbnailer> {
    port: P,
}

impl<P: ThumbnailPort> ThumbnailExtractor<P> {
    /// Extractor over the given thumbnail routine
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Get the thumbnail routine
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Generate a thumbnail for `path` and copy it out of native memory.
    ///
    /// The native buffer is released before this returns, on success and
    /// failure alike. A non-zero native status is reported as
    /// [`AvParamsError::ExtractionFailed`]; the native layer does not say why.
    pub fn extract<Q: AsRef<Path>>(&self, path: Q) -> AvParamsResult<Thumbnail> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let c_path = path_to_cstring(path).ok_or_else(|| {
            warn!("Path {:?} contains an interior NUL byte", display);
            AvParamsError::ExtractionFailed {
                path: display.clone(),
                status: None,
            }
        })?;

        let mut out_buf: *mut u8 = std::ptr::null_mut();
        let mut out_size: usize = 0;
        let status = self.port.generate(&c_path, &mut out_buf, &mut out_size);
        let buffer = ForeignBuffer {
            port: &self.port,
            ptr: out_buf,
        };

        if status != 0 {
            debug!("Native thumbnail routine returned status {} for {}", status, display);
            return Err(AvParamsError::ExtractionFailed {
                path: display,
                status: Some(status),
            });
        }

        if buffer.ptr.is_null() {
            if out_size == 0 {
                return Ok(Thumbnail { bytes: Vec::new() });
            }
            warn!("Native thumbnail routine reported {} bytes but no buffer", out_size);
            return Err(AvParamsError::ExtractionFailed {
                path: display,
                status: Some(status),
            });
        }

        // SAFETY: on success the port guarantees `out_size` readable bytes at
        // `out_buf`, and the guard keeps them alive until after the copy.
        let bytes = unsafe { std::slice::from_raw_parts(buffer.ptr, out_size) }.to_vec();
        drop(buffer);

        info!("Extracted {} byte thumbnail from {}", bytes.len(), display);
        Ok(Thumbnail { bytes })
    }
}

#[cfg(unix)]
fn path_to_cstring(path: &Path) -> Option<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).ok()
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> Option<CString> {
    CString::new(path.to_string_lossy().as_bytes()).ok()
}

#[cfg(test)]
mod tests;
