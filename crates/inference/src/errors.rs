use capture::CaptureError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Required file not found: {}", path.display())]
    ResourceNotFound { path: PathBuf },

    #[error("Video source {descriptor} unavailable: {reason}")]
    SourceUnavailable { descriptor: String, reason: String },

    #[error(
        "Engine {} selected but this build has no TensorRT support (enable the trt-backend feature)",
        path.display()
    )]
    AcceleratorUnsupported { path: PathBuf },

    #[error("Failed to load model {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Failed to write artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error("Engine export failed: {0}")]
    ExportFailed(String),

    #[error("Startup failed: {0}")]
    Startup(String),
}

impl RuntimeError {
    /// Map a failed source open into `SourceUnavailable`.
    pub fn source_unavailable(descriptor: impl std::fmt::Display, err: CaptureError) -> Self {
        let reason = match err {
            CaptureError::Open { reason, .. } => reason,
            other => other.to_string(),
        };
        RuntimeError::SourceUnavailable {
            descriptor: descriptor.to_string(),
            reason,
        }
    }

    /// Process exit code, one per failure cause.
    pub fn exit_code(&self) -> u8 {
        match self {
            RuntimeError::Startup(_) => 1,
            RuntimeError::InvalidConfig(_) => 2,
            RuntimeError::ResourceNotFound { .. } => 3,
            RuntimeError::SourceUnavailable { .. } => 4,
            RuntimeError::AcceleratorUnsupported { .. } => 5,
            RuntimeError::ModelLoad { .. } => 6,
            RuntimeError::Inference(_) | RuntimeError::Display(_) | RuntimeError::Artifact { .. } => 7,
            RuntimeError::ExportFailed(_) => 8,
        }
    }
}
