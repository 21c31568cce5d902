// Unit tests for thumbnail extraction

use super::*;
use std::cell::{Cell, RefCell};
use std::ffi::{c_int, CStr};

/// Native thumbnail stand-in that hands out heap buffers and counts releases
struct FakeThumbnailer {
    status: c_int,
    payload: Option<Vec<u8>>,
    reported_size: Option<usize>,
    handed_out: Cell<usize>,
    releases: Cell<usize>,
    calls: RefCell<Vec<String>>,
}

impl FakeThumbnailer {
    fn new(status: c_int, payload: Option<Vec<u8>>) -> Self {
        Self {
            status,
            payload,
            reported_size: None,
            handed_out: Cell::new(0),
            releases: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl ThumbnailPort for FakeThumbnailer {
    fn generate(&self, input: &CStr, out_buf: &mut *mut u8, out_size: &mut usize) -> c_int {
        self.calls
            .borrow_mut()
            .push(input.to_string_lossy().into_owned());

        if let Some(payload) = &self.payload {
            let boxed = payload.clone().into_boxed_slice();
            self.handed_out.set(boxed.len());
            *out_size = self.reported_size.unwrap_or(boxed.len());
            *out_buf = Box::into_raw(boxed) as *mut u8;
        } else {
            *out_size = self.reported_size.unwrap_or(0);
        }
        self.status
    }

    unsafe fn release_buffer(&self, buf: *mut u8) {
        self.releases.set(self.releases.get() + 1);
        let slice = std::ptr::slice_from_raw_parts_mut(buf, self.handed_out.get());
        drop(Box::from_raw(slice));
    }
}

fn jpeg_payload() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9]
}

#[test]
fn test_extract_copies_bytes_and_releases_once() {
    let extractor = ThumbnailExtractor::new(FakeThumbnailer::new(0, Some(jpeg_payload())));

    let thumbnail = extractor.extract("movie.mkv").unwrap();

    assert_eq!(thumbnail.as_bytes(), jpeg_payload().as_slice());
    assert!(thumbnail.is_jpeg());
    assert_eq!(extractor.port().releases.get(), 1);
    assert_eq!(extractor.port().calls.borrow().as_slice(), ["movie.mkv"]);
}

#[test]
fn test_nonzero_status_fails_without_buffer() {
    let extractor = ThumbnailExtractor::new(FakeThumbnailer::new(-2, None));

    let err = extractor.extract("missing.mp4").unwrap_err();

    assert_eq!(
        err,
        AvParamsError::ExtractionFailed {
            path: "missing.mp4".to_string(),
            status: Some(-2),
        }
    );
    assert_eq!(extractor.port().releases.get(), 0);
}

#[test]
fn test_nonzero_status_still_releases_stray_buffer() {
    let extractor = ThumbnailExtractor::new(FakeThumbnailer::new(1, Some(jpeg_payload())));

    assert!(extractor.extract("broken.avi").is_err());
    assert_eq!(extractor.port().releases.get(), 1);
}

#[test]
fn test_interior_nul_never_reaches_native_side() {
    let extractor = ThumbnailExtractor::new(FakeThumbnailer::new(0, Some(jpeg_payload())));

    let err = extractor.extract("bad\0name.mp4").unwrap_err();

    assert!(matches!(err, AvParamsError::ExtractionFailed { status: None, .. }));
    assert!(extractor.port().calls.borrow().is_empty());
    assert_eq!(extractor.port().releases.get(), 0);
}

#[test]
fn test_success_with_empty_output() {
    let extractor = ThumbnailExtractor::new(FakeThumbnailer::new(0, None));

    let thumbnail = extractor.extract("empty.png").unwrap();

    assert!(thumbnail.is_empty());
    assert!(!thumbnail.is_jpeg());
    assert_eq!(extractor.port().releases.get(), 0);
}

#[test]
fn test_success_with_size_but_no_buffer_fails() {
    let mut fake = FakeThumbnailer::new(0, None);
    fake.reported_size = Some(64);
    let extractor = ThumbnailExtractor::new(fake);

    let err = extractor.extract("odd.mp4").unwrap_err();

    assert_eq!(
        err,
        AvParamsError::ExtractionFailed {
            path: "odd.mp4".to_string(),
            status: Some(0),
        }
    );
}

#[test]
fn test_copy_respects_reported_size() {
    let mut fake = FakeThumbnailer::new(0, Some(jpeg_payload()));
    fake.reported_size = Some(4);
    let extractor = ThumbnailExtractor::new(fake);

    let thumbnail = extractor.extract("short.mp4").unwrap();

    assert_eq!(thumbnail.into_vec(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
    assert_eq!(extractor.port().releases.get(), 1);
}

#[test]
fn test_save_writes_bytes() {
    let extractor = ThumbnailExtractor::new(FakeThumbnailer::new(0, Some(jpeg_payload())));
    let thumbnail = extractor.extract("movie.mkv").unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("thumbnail.jpg");
    thumbnail.save(&target).unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), jpeg_payload());
    assert_eq!(thumbnail.len(), jpeg_payload().len());
}
