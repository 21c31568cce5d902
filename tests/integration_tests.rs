use assert_cmd::Command;
use avparams_cli::adapters::{LibavConverter, LibavThumbnailer};
use avparams_cli::*;
use ffmpeg_next::ffi::{AVCodecID, AVCodecParameters};
use ffmpeg_next::{codec, media};
use std::cell::{Cell, RefCell};
use std::ffi::{c_char, c_int, CStr};
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

/// Test utilities for the native layer
mod test_utils {
    use super::*;

    /// Call counters shared between a fake port and the test body
    #[derive(Default)]
    pub struct Ledger {
        pub allocations: Cell<usize>,
        pub releases: Cell<usize>,
        pub live: RefCell<Vec<usize>>,
    }

    /// Parameters allocator that tracks every live block
    pub struct CountingPort {
        pub ledger: Rc<Ledger>,
        pub out_of_memory: bool,
    }

    impl CountingPort {
        pub fn new() -> (Self, Rc<Ledger>) {
            let ledger = Rc::new(Ledger::default());
            let port = Self {
                ledger: Rc::clone(&ledger),
                out_of_memory: false,
            };
            (port, ledger)
        }
    }

    impl CodecParametersPort for CountingPort {
        fn allocate(&self) -> *mut AVCodecParameters {
            if self.out_of_memory {
                return std::ptr::null_mut();
            }
            let params: AVCodecParameters = unsafe { std::mem::zeroed() };
            let ptr = Box::into_raw(Box::new(params));
            self.ledger.allocations.set(self.ledger.allocations.get() + 1);
            self.ledger.live.borrow_mut().push(ptr as usize);
            ptr
        }

        unsafe fn release(&self, params: *mut AVCodecParameters) {
            let mut live = self.ledger.live.borrow_mut();
            let slot = live
                .iter()
                .position(|&p| p == params as usize)
                .expect("release of a block that is not live");
            live.remove(slot);
            self.ledger.releases.set(self.ledger.releases.get() + 1);
            drop(Box::from_raw(params));
        }

        fn codec_name(&self, id: AVCodecID) -> *const c_char {
            match id {
                AVCodecID::AV_CODEC_ID_MJPEG => c"mjpeg".as_ptr(),
                _ => std::ptr::null(),
            }
        }
    }

    /// Thumbnail routine returning a fixed status and payload
    pub struct ScriptedThumbnailer {
        pub status: c_int,
        pub payload: Vec<u8>,
        pub releases: Cell<usize>,
    }

    impl ThumbnailPort for ScriptedThumbnailer {
        fn generate(&self, _input: &CStr, out_buf: &mut *mut u8, out_size: &mut usize) -> c_int {
            if self.status == 0 {
                let boxed = self.payload.clone().into_boxed_slice();
                *out_size = boxed.len();
                *out_buf = Box::into_raw(boxed) as *mut u8;
            }
            self.status
        }

        unsafe fn release_buffer(&self, buf: *mut u8) {
            self.releases.set(self.releases.get() + 1);
            let slice = std::ptr::slice_from_raw_parts_mut(buf, self.payload.len());
            drop(Box::from_raw(slice));
        }
    }

    /// Create a short test video using the ffmpeg binary, if one is installed
    pub fn create_test_video(output_path: &Path) -> bool {
        std::process::Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=1:size=640x360:rate=10",
                "-c:v",
                "mpeg4",
                "-y",
            ])
            .arg(output_path)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Create a short AVI with MPEG-4 video and PCM audio, if ffmpeg is installed
    pub fn create_test_avi(output_path: &Path) -> bool {
        std::process::Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=1:size=320x240:rate=25",
                "-f",
                "lavfi",
                "-i",
                "sine=frequency=440:duration=1:sample_rate=44100",
                "-c:v",
                "mpeg4",
                "-c:a",
                "pcm_s16le",
                "-y",
            ])
            .arg(output_path)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Codec ids of the best video and audio streams in `path`
    pub fn stream_codecs(path: &Path) -> (Option<codec::Id>, Option<codec::Id>) {
        let ictx = ffmpeg_next::format::input(&path).unwrap();
        let id_of = |kind| ictx.streams().best(kind).map(|s| s.parameters().id());
        (id_of(media::Type::Video), id_of(media::Type::Audio))
    }
}

use test_utils::*;

#[test]
fn test_allocations_match_releases_across_exit_paths() {
    let (port, ledger) = CountingPort::new();
    let port = Rc::new(port);

    struct Shared(Rc<CountingPort>);
    impl CodecParametersPort for Shared {
        fn allocate(&self) -> *mut AVCodecParameters {
            self.0.allocate()
        }
        unsafe fn release(&self, params: *mut AVCodecParameters) {
            self.0.release(params)
        }
        fn codec_name(&self, id: AVCodecID) -> *const c_char {
            self.0.codec_name(id)
        }
    }

    // Scope exit
    {
        let _params = CodecParameters::with_port(Shared(Rc::clone(&port))).unwrap();
    }
    // Explicit close
    CodecParameters::with_port(Shared(Rc::clone(&port))).unwrap().close();
    // Explicit release followed by drop
    let params = CodecParameters::with_port(Shared(Rc::clone(&port))).unwrap();
    assert!(params.release());
    drop(params);
    // Early return path
    let early = || -> AvParamsResult<()> {
        let _params = CodecParameters::with_port(Shared(Rc::clone(&port)))?;
        Err(AvParamsError::AllocationFailed)
    };
    assert!(early().is_err());

    assert_eq!(ledger.allocations.get(), 4);
    assert_eq!(ledger.releases.get(), 4);
    assert!(ledger.live.borrow().is_empty());
}

#[test]
fn test_double_release_frees_once() {
    let (port, ledger) = CountingPort::new();
    let params = CodecParameters::with_port(port).unwrap();

    assert!(params.release());
    assert!(!params.release());
    params.close();

    assert_eq!(ledger.releases.get(), 1);
}

#[test]
fn test_null_allocation_is_reported() {
    let (mut port, ledger) = CountingPort::new();
    port.out_of_memory = true;

    let err = CodecParameters::with_port(port).unwrap_err();

    assert_eq!(err, AvParamsError::AllocationFailed);
    assert_eq!(ledger.releases.get(), 0);
}

#[test]
fn test_params_survive_move_into_other_owner() {
    let (port, ledger) = CountingPort::new();
    let mut params = CodecParameters::with_port(port).unwrap();
    unsafe {
        params.raw_mut().codec_id = AVCodecID::AV_CODEC_ID_MJPEG;
    }

    let owners = vec![params];
    assert_eq!(owners[0].codec_name().as_deref(), Some("mjpeg"));
    assert_eq!(ledger.releases.get(), 0);
    drop(owners);
    assert_eq!(ledger.releases.get(), 1);
}

#[test]
fn test_extraction_failure_is_surfaced() {
    let extractor = ThumbnailExtractor::new(ScriptedThumbnailer {
        status: 3,
        payload: vec![0xFF, 0xD8],
        releases: Cell::new(0),
    });

    let err = extractor.extract("unsupported.xyz").unwrap_err();

    assert!(matches!(err, AvParamsError::ExtractionFailed { status: Some(3), .. }));
    assert_eq!(extractor.port().releases.get(), 0);
}

#[test]
fn test_extraction_copies_exact_bytes() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let extractor = ThumbnailExtractor::new(ScriptedThumbnailer {
        status: 0,
        payload: payload.clone(),
        releases: Cell::new(0),
    });

    let thumbnail = extractor.extract("movie.mp4").unwrap();

    assert_eq!(thumbnail.as_bytes(), payload.as_slice());
    assert_eq!(extractor.port().releases.get(), 1);
}

#[test]
fn test_libav_handle_lifecycle() {
    let mut params = CodecParameters::create().unwrap();
    unsafe {
        let raw = params.raw_mut();
        raw.bit_rate = 500_000;
        raw.width = 1280;
        raw.height = 720;
    }

    assert_eq!(params.bit_rate(), 500_000);
    assert_eq!(params.width(), 1280);
    assert_eq!(params.height(), 720);
    assert!(params.is_live());
    params.close();
}

#[test]
fn test_libav_thumbnail_from_generated_video() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.mp4");
    if !create_test_video(&input) {
        eprintln!("ffmpeg binary not available, skipping");
        return;
    }

    let extractor = ThumbnailExtractor::new(LibavThumbnailer::new(160, 160).with_quality(75));
    let thumbnail = extractor.extract(&input).unwrap();
    assert!(thumbnail.is_jpeg());

    let output = temp_dir.path().join("thumbnail.jpg");
    thumbnail.save(&output).unwrap();

    let ictx = ffmpeg_next::format::input(&output).unwrap();
    let stream = ictx.streams().best(ffmpeg_next::media::Type::Video).unwrap();
    let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .unwrap()
        .decoder()
        .video()
        .unwrap();
    assert_eq!((decoder.width(), decoder.height()), (160, 90));
}

#[test]
fn test_libav_thumbnail_rejects_garbage() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("garbage.mp4");
    std::fs::write(&input, b"definitely not a video").unwrap();

    let extractor = ThumbnailExtractor::new(LibavThumbnailer::default());
    let err = extractor.extract(&input).unwrap_err();

    assert!(matches!(err, AvParamsError::ExtractionFailed { status: Some(s), .. } if s != 0));
}

#[test]
fn test_convert_avi_to_mpeg4_aac() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.avi");
    if !create_test_avi(&input) {
        eprintln!("ffmpeg binary not available, skipping");
        return;
    }
    init().unwrap();

    let output = temp_dir.path().join("out").join("output.mp4");
    let request = ConvertRequest::new(codec::Id::MPEG4, codec::Id::AAC)
        .with_video_bitrate(400_000)
        .with_audio_bitrate(96_000);
    let stats = MediaConverter::new(LibavConverter)
        .convert(&input, &output, &request)
        .unwrap();

    assert_eq!(stats.video_frames, 25);
    assert!(stats.audio_frames > 0);
    assert!(stats.bytes_written > 0);
    assert_eq!(
        stream_codecs(&output),
        (Some(codec::Id::MPEG4), Some(codec::Id::AAC))
    );
}

#[test]
fn test_convert_h264_crf() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.avi");
    if !create_test_avi(&input) {
        eprintln!("ffmpeg binary not available, skipping");
        return;
    }
    init().unwrap();
    if ffmpeg_next::encoder::find(codec::Id::H264).is_none() {
        eprintln!("no H.264 encoder in this libav build, skipping");
        return;
    }

    let output = temp_dir.path().join("output.mp4");
    let request = ConvertRequest::default().with_video_bitrate(28);
    let stats = MediaConverter::new(LibavConverter)
        .convert(&input, &output, &request)
        .unwrap();

    assert!(stats.video_frames > 0);
    assert_eq!(stream_codecs(&output).0, Some(codec::Id::H264));
}

#[test]
fn test_convert_garbage_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("garbage.avi");
    std::fs::write(&input, b"RIFF but not really").unwrap();
    init().unwrap();

    let err = MediaConverter::new(LibavConverter)
        .convert(&input, temp_dir.path().join("out.mp4"), &ConvertRequest::default())
        .unwrap_err();

    assert!(matches!(err, ConvertError::Libav { .. } | ConvertError::NoVideoStream { .. }));
}

// CLI tests

fn avparams() -> Command {
    let mut cmd = Command::cargo_bin("avparams").unwrap();
    cmd.env_remove("RUST_LOG").env("AVPARAMS_LOG_LEVEL", "error");
    cmd
}

#[test]
fn test_cli_help_lists_commands() {
    let output = avparams().arg("--help").output().unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    assert!(stdout.contains("params"));
    assert!(stdout.contains("thumbnail"));
    assert!(stdout.contains("convert"));
}

#[test]
fn test_cli_params_updates_fields() {
    let temp_dir = TempDir::new().unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["params", "--bit-rate", "500000", "--width", "1280", "--height", "720", "--codec", "h264"])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    assert!(stdout.contains("Bitrate: 0"));
    assert!(stdout.contains("Resolution: 0 x 0"));
    assert!(stdout.contains("Updated Bitrate: 500000"));
    assert!(stdout.contains("Updated Resolution: 1280 x 720"));
    assert!(stdout.contains("Updated Codec: h264"));
}

#[test]
fn test_cli_params_json() {
    let temp_dir = TempDir::new().unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["params", "--width", "640", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["initial"]["width"], 0);
    assert_eq!(report["updated"]["width"], 640);
}

#[test]
fn test_cli_params_unknown_codec_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["params", "--codec", "no-such-codec"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown codec"));
}

#[test]
fn test_cli_thumbnail_missing_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["thumbnail", "--input", "missing.mp4"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!temp_dir.path().join("thumbnail.jpg").exists());
}

#[test]
fn test_cli_thumbnail_rejects_bad_quality() {
    let output = avparams()
        .args(["thumbnail", "--input", "in.mp4", "--quality", "0"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[cfg(not(feature = "os-thumbnail"))]
#[test]
fn test_cli_thumbnail_os_backend_needs_feature() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("in.mp4"), b"placeholder").unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["thumbnail", "--input", "in.mp4", "--backend", "os"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("os-thumbnail"));
    assert!(!temp_dir.path().join("thumbnail.jpg").exists());
}

#[test]
fn test_cli_convert_missing_input_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["convert", "--input", "missing.avi", "--output", "out.mp4"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Input file not found"));
    assert!(!temp_dir.path().join("out.mp4").exists());
}

#[test]
fn test_cli_convert_unknown_codec_fails() {
    let temp_dir = TempDir::new().unwrap();
    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["convert", "-i", "in.avi", "-o", "out.mp4", "--audio-codec", "no-such-codec"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown audio codec"));
}

#[test]
fn test_cli_convert_json() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.avi");
    if !create_test_avi(&input) {
        eprintln!("ffmpeg binary not available, skipping");
        return;
    }

    let output = avparams()
        .current_dir(temp_dir.path())
        .args(["convert", "-i", "input.avi", "-o", "output.mkv", "--video-codec", "mpeg4", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(report["stats"]["video_frames"].as_u64().unwrap() > 0);
    assert!(temp_dir.path().join("output.mkv").exists());
}
