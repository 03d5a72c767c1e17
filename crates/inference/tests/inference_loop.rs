use capture::{CaptureError, Display, Frame, FrameSource};
use clap::Parser;
use inference::{
    ArtifactWriter, Backend, Cli, Detection, Detector, InferenceLoop, InferenceOptions,
    RuntimeConfig, RuntimeError, TerminationReason, config::Environment, resolve_backend, service,
};
use std::{
    cell::Cell,
    fs,
    num::NonZeroU64,
    path::Path,
    rc::Rc,
    sync::{Arc, atomic::AtomicBool},
};
use tempfile::TempDir;

/// Yields `limit` small frames (or forever), counting pulls and releases.
struct ScriptedSource {
    limit: Option<u64>,
    pulled: Rc<Cell<u64>>,
    released: Rc<Cell<u32>>,
}

impl ScriptedSource {
    fn new(limit: Option<u64>) -> (Self, Rc<Cell<u64>>, Rc<Cell<u32>>) {
        let pulled = Rc::new(Cell::new(0));
        let released = Rc::new(Cell::new(0));
        let source = Self {
            limit,
            pulled: Rc::clone(&pulled),
            released: Rc::clone(&released),
        };
        (source, pulled, released)
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.limit.is_some_and(|limit| self.pulled.get() >= limit) {
            return Ok(None);
        }
        self.pulled.set(self.pulled.get() + 1);
        Ok(Some(Frame::new(8, 8)))
    }

    fn release(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

/// Window whose user presses quit once `quit_after` frames were shown.
struct ScriptedDisplay {
    quit_after: u64,
    shown: Rc<Cell<u64>>,
    released: Rc<Cell<u32>>,
}

impl Display for ScriptedDisplay {
    fn present(&mut self, _frame: &Frame) -> Result<(), CaptureError> {
        self.shown.set(self.shown.get() + 1);
        Ok(())
    }

    fn quit_requested(&mut self) -> bool {
        self.shown.get() >= self.quit_after
    }

    fn release(&mut self) {
        self.released.set(self.released.get() + 1);
    }
}

struct NoDetections;

impl Detector for NoDetections {
    fn infer(
        &mut self,
        _frame: &Frame,
        _options: &InferenceOptions,
    ) -> Result<Vec<Detection>, RuntimeError> {
        Ok(Vec::new())
    }

    fn render(&self, frame: &Frame, _detections: &[Detection]) -> Frame {
        frame.clone()
    }
}

/// Fails on the frame with index `fail_at`.
struct FailingDetector {
    fail_at: u64,
    seen: u64,
}

impl Detector for FailingDetector {
    fn infer(
        &mut self,
        _frame: &Frame,
        _options: &InferenceOptions,
    ) -> Result<Vec<Detection>, RuntimeError> {
        let index = self.seen;
        self.seen += 1;
        if index == self.fail_at {
            return Err(RuntimeError::Inference("forward pass failed".to_string()));
        }
        Ok(Vec::new())
    }

    fn render(&self, frame: &Frame, _detections: &[Detection]) -> Frame {
        frame.clone()
    }
}

fn options() -> InferenceOptions {
    InferenceOptions::for_backend(
        Backend::Portable {
            half_precision: false,
        },
        640,
        0.25,
    )
}

fn inference_loop(dir: &Path, save_stride: u64, log_stride: u64) -> InferenceLoop<NoDetections> {
    let writer = ArtifactWriter::new(dir, NonZeroU64::new(save_stride).unwrap()).unwrap();
    InferenceLoop::new(
        NoDetections,
        options(),
        writer,
        NonZeroU64::new(log_stride).unwrap(),
    )
}

fn saved_artifacts(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn config(args: &[&str]) -> RuntimeConfig {
    let cli = Cli::try_parse_from(std::iter::once("infer").chain(args.iter().copied())).unwrap();
    RuntimeConfig::from_cli_with_env(cli, Environment::Development).unwrap()
}

#[test]
fn test_short_stream_ends_without_throughput_reports() {
    let out = TempDir::new().unwrap();
    let (source, pulled, released) = ScriptedSource::new(Some(37));

    let report = inference_loop(out.path(), 10, 100)
        .run(source, None::<ScriptedDisplay>)
        .unwrap();

    assert_eq!(report.reason, TerminationReason::StreamExhausted);
    assert_eq!(report.frames_processed, 37);
    assert_eq!(report.throughput_reports, 0);
    assert_eq!(pulled.get(), 37);
    assert_eq!(released.get(), 1);
    assert_eq!(
        saved_artifacts(out.path()),
        vec![
            "frame_00000000.jpg",
            "frame_00000010.jpg",
            "frame_00000020.jpg",
            "frame_00000030.jpg",
        ]
    );
}

#[test]
fn test_throughput_reported_every_log_stride() {
    let out = TempDir::new().unwrap();
    let (source, _, _) = ScriptedSource::new(Some(25));

    let report = inference_loop(out.path(), 100, 10)
        .run(source, None::<ScriptedDisplay>)
        .unwrap();

    assert_eq!(report.frames_processed, 25);
    assert_eq!(report.throughput_reports, 2, "after frames 10 and 20");
}

#[test]
fn test_quit_key_stops_infinite_source_and_releases_once() {
    let out = TempDir::new().unwrap();
    let (source, pulled, source_released) = ScriptedSource::new(None);
    let shown = Rc::new(Cell::new(0));
    let display_released = Rc::new(Cell::new(0));
    let display = ScriptedDisplay {
        quit_after: 5,
        shown: Rc::clone(&shown),
        released: Rc::clone(&display_released),
    };

    let report = inference_loop(out.path(), 1, 100)
        .run(source, Some(display))
        .unwrap();

    assert_eq!(report.reason, TerminationReason::UserQuit);
    assert_eq!(report.frames_processed, 5);
    assert_eq!(pulled.get(), 5, "No frame is pulled after quit");
    assert_eq!(shown.get(), 5);
    assert_eq!(source_released.get(), 1);
    assert_eq!(display_released.get(), 1);
}

#[test]
fn test_detector_failure_releases_source_and_display_once() {
    let out = TempDir::new().unwrap();
    let (source, pulled, source_released) = ScriptedSource::new(None);
    let shown = Rc::new(Cell::new(0));
    let display_released = Rc::new(Cell::new(0));
    let display = ScriptedDisplay {
        quit_after: u64::MAX,
        shown: Rc::clone(&shown),
        released: Rc::clone(&display_released),
    };
    let writer = ArtifactWriter::new(out.path(), NonZeroU64::new(1).unwrap()).unwrap();
    let detector = FailingDetector {
        fail_at: 3,
        seen: 0,
    };

    let err = InferenceLoop::new(detector, options(), writer, NonZeroU64::new(100).unwrap())
        .run(source, Some(display))
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Inference(_)));
    assert_eq!(err.exit_code(), 7);
    assert_eq!(pulled.get(), 4, "Frames 0..=3 were pulled");
    assert_eq!(shown.get(), 3, "The failing frame is never shown");
    assert_eq!(saved_artifacts(out.path()).len(), 3);
    assert_eq!(source_released.get(), 1);
    assert_eq!(display_released.get(), 1);
}

#[test]
fn test_stride_one_saves_every_frame_in_order() {
    let out = TempDir::new().unwrap();
    let (source, _, _) = ScriptedSource::new(Some(12));

    let report = inference_loop(out.path(), 1, 100)
        .run(source, None::<ScriptedDisplay>)
        .unwrap();

    let expected: Vec<String> = (0..12).map(|i| format!("frame_{i:08}.jpg")).collect();
    assert_eq!(report.artifacts_written, 12);
    assert_eq!(saved_artifacts(out.path()), expected);
}

#[test]
fn test_stride_selection_over_long_runs() {
    let out = TempDir::new().unwrap();
    for stride in [1u64, 3, 10, 97] {
        let writer = ArtifactWriter::new(out.path(), NonZeroU64::new(stride).unwrap()).unwrap();
        let selected = (0..10_000u64).filter(|&i| writer.should_write(i)).count() as u64;
        assert_eq!(selected, 10_000_u64.div_ceil(stride), "stride {stride}");
    }
}

#[test]
fn test_stop_flag_ends_run_as_user_quit() {
    let out = TempDir::new().unwrap();
    let (source, pulled, released) = ScriptedSource::new(None);

    let report = inference_loop(out.path(), 1, 100)
        .with_stop_flag(Arc::new(AtomicBool::new(true)))
        .run(source, None::<ScriptedDisplay>)
        .unwrap();

    assert_eq!(report.reason, TerminationReason::UserQuit);
    assert_eq!(pulled.get(), 0);
    assert_eq!(released.get(), 1);
}

#[test]
fn test_missing_engine_falls_back_to_half_precision_weights() {
    let models = TempDir::new().unwrap();
    let weights = models.path().join("best.onnx");
    let engine = models.path().join("best.engine");
    fs::write(&weights, b"onnx").unwrap();

    let config = config(&[
        "--use_trt",
        "1",
        "--half",
        "1",
        "--weights",
        weights.to_str().unwrap(),
        "--engine",
        engine.to_str().unwrap(),
    ]);

    let resolved = resolve_backend(&config);
    assert!(!resolved.is_accelerated());
    assert_eq!(resolved.artifact_path, weights);
    assert_eq!(resolved.options.half_precision, Some(true));

    assert_eq!(resolve_backend(&config), resolved, "Resolution is idempotent");
}

#[test]
fn test_missing_weights_fail_before_source_is_opened() {
    let models = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let weights = models.path().join("best.onnx");

    let config = config(&[
        "--source",
        "/nonexistent/clip.mp4",
        "--show",
        "0",
        "--device",
        "cpu",
        "--weights",
        weights.to_str().unwrap(),
        "--engine",
        models.path().join("best.engine").to_str().unwrap(),
        "--output-dir",
        out.path().join("frames").to_str().unwrap(),
    ]);
    let resolved = resolve_backend(&config);

    let err = service::run(&config, &resolved, Arc::new(AtomicBool::new(false))).unwrap_err();

    assert!(matches!(err, RuntimeError::ResourceNotFound { ref path } if *path == weights));
    assert_eq!(err.exit_code(), 3);
    assert!(!out.path().join("frames").exists(), "Nothing was written");
}
