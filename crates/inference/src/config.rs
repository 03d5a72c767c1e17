use crate::{backend::ExecutionProvider, errors::RuntimeError};
use capture::{CaptureOptions, SourceDescriptor};
use clap::Parser;
use std::{num::NonZeroU64, path::PathBuf};

pub use common::Environment;

/// Real-time object detection over a camera, video file, stream or GStreamer pipeline.
#[derive(Parser, Debug, Clone)]
#[command(name = "infer", version, about)]
pub struct Cli {
    /// Camera index, video file / stream URL, or GStreamer pipeline
    #[arg(long, env = "SOURCE", default_value = "0")]
    pub source: String,

    /// Inference resolution (square)
    #[arg(long, env = "IMGSZ", default_value_t = 640)]
    pub imgsz: u32,

    /// Confidence threshold
    #[arg(long, env = "CONF", default_value_t = 0.25)]
    pub conf: f32,

    /// Half precision (1/0), ONNX weights only
    #[arg(long, env = "HALF", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub half: u8,

    /// Prefer the TensorRT engine when it exists (1/0)
    #[arg(long = "use_trt", env = "USE_TRT", default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub use_trt: u8,

    /// Open a live window (1/0)
    #[arg(long, env = "SHOW", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub show: u8,

    /// Frames between saved annotated frames
    #[arg(long, env = "SAVE_STRIDE", default_value_t = 10)]
    pub save_stride: u64,

    /// Frames between throughput reports
    #[arg(long, env = "LOG_STRIDE", default_value_t = 100)]
    pub log_stride: u64,

    /// ONNX weights
    #[arg(long, env = "WEIGHTS_PATH", default_value = "models/best.onnx")]
    pub weights: PathBuf,

    /// TensorRT engine
    #[arg(long, env = "ENGINE_PATH", default_value = "models/best.engine")]
    pub engine: PathBuf,

    /// Directory for annotated frames
    #[arg(long, env = "OUTPUT_DIR", default_value = "out")]
    pub output_dir: PathBuf,

    /// NMS IoU threshold
    #[arg(long, env = "IOU_THRESHOLD", default_value_t = 0.7)]
    pub iou: f32,

    /// ONNX Runtime execution provider
    #[arg(long, env = "DEVICE", value_enum, default_value_t = ExecutionProvider::Cuda)]
    pub device: ExecutionProvider,

    /// Output size for GStreamer pipeline sources, WIDTHxHEIGHT
    #[arg(long, env = "FRAME_SIZE", default_value = "1280x720")]
    pub frame_size: String,

    /// OTLP collector for trace export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub environment: Environment,
    pub source: SourceDescriptor,
    pub image_size: u32,
    pub confidence_threshold: f32,
    pub half_precision: bool,
    pub prefer_accelerated: bool,
    pub show_live_window: bool,
    pub artifact_save_stride: NonZeroU64,
    pub log_stride: NonZeroU64,
    pub weights_path: PathBuf,
    pub engine_path: PathBuf,
    pub output_dir: PathBuf,
    pub iou_threshold: f32,
    pub device: ExecutionProvider,
    pub frame_size: (u32, u32),
    pub otel_endpoint: Option<String>,
}

impl RuntimeConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, RuntimeError> {
        Self::from_cli_with_env(cli, Environment::from_env())
    }

    pub fn from_cli_with_env(cli: Cli, environment: Environment) -> Result<Self, RuntimeError> {
        let source = cli
            .source
            .parse::<SourceDescriptor>()
            .map_err(RuntimeError::InvalidConfig)?;

        if cli.imgsz == 0 {
            return Err(RuntimeError::InvalidConfig(
                "imgsz must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&cli.conf) {
            return Err(RuntimeError::InvalidConfig(format!(
                "conf must be within [0, 1], got {}",
                cli.conf
            )));
        }
        if !(0.0..=1.0).contains(&cli.iou) {
            return Err(RuntimeError::InvalidConfig(format!(
                "iou must be within [0, 1], got {}",
                cli.iou
            )));
        }

        let artifact_save_stride = NonZeroU64::new(cli.save_stride).ok_or_else(|| {
            RuntimeError::InvalidConfig("save-stride must be a positive integer".to_string())
        })?;
        let log_stride = NonZeroU64::new(cli.log_stride).ok_or_else(|| {
            RuntimeError::InvalidConfig("log-stride must be a positive integer".to_string())
        })?;

        let frame_size = parse_frame_size(&cli.frame_size).ok_or_else(|| {
            RuntimeError::InvalidConfig(format!(
                "frame-size must look like 1280x720, got {:?}",
                cli.frame_size
            ))
        })?;

        Ok(Self {
            environment,
            source,
            image_size: cli.imgsz,
            confidence_threshold: cli.conf,
            half_precision: cli.half == 1,
            prefer_accelerated: cli.use_trt == 1,
            show_live_window: cli.show == 1,
            artifact_save_stride,
            log_stride,
            weights_path: cli.weights,
            engine_path: cli.engine,
            output_dir: cli.output_dir,
            iou_threshold: cli.iou,
            device: cli.device,
            frame_size,
            otel_endpoint: cli.otel_endpoint.filter(|e| !e.trim().is_empty()),
        })
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            pipeline_frame_size: self.frame_size,
        }
    }
}

fn parse_frame_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
