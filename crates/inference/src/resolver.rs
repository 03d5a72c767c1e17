//! Picks the model artifact a run will load.

use crate::config::RuntimeConfig;
use std::path::{Path, PathBuf};

/// Which representation of the model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Serialized TensorRT engine. Precision was fixed when it was built.
    Accelerated,
    /// ONNX weights run through ONNX Runtime.
    Portable { half_precision: bool },
}

/// Per-frame options handed to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceOptions {
    pub image_size: u32,
    pub confidence_threshold: f32,
    /// `None` for engines, which reject a precision override.
    pub half_precision: Option<bool>,
}

impl InferenceOptions {
    pub fn for_backend(backend: Backend, image_size: u32, confidence_threshold: f32) -> Self {
        let half_precision = match backend {
            Backend::Accelerated => None,
            Backend::Portable { half_precision } => Some(half_precision),
        };
        Self {
            image_size,
            confidence_threshold,
            half_precision,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBackend {
    pub artifact_path: PathBuf,
    pub backend: Backend,
    pub options: InferenceOptions,
}

impl ResolvedBackend {
    pub fn is_accelerated(&self) -> bool {
        self.backend == Backend::Accelerated
    }
}

/// Choose between the engine and the ONNX weights.
///
/// The engine wins only when it is preferred *and* present; otherwise the
/// portable weights are used whether or not they exist. A missing weights file
/// is reported later, when the detector is built.
pub fn resolve(
    prefer_accelerated: bool,
    accelerated_path: &Path,
    portable_path: &Path,
    image_size: u32,
    confidence_threshold: f32,
    half_precision: bool,
) -> ResolvedBackend {
    let (artifact_path, backend) = if prefer_accelerated && accelerated_path.is_file() {
        (accelerated_path, Backend::Accelerated)
    } else {
        if prefer_accelerated {
            tracing::warn!(
                engine = %accelerated_path.display(),
                "Engine not found, falling back to ONNX weights"
            );
        }
        (portable_path, Backend::Portable { half_precision })
    };

    ResolvedBackend {
        artifact_path: artifact_path.to_path_buf(),
        backend,
        options: InferenceOptions::for_backend(backend, image_size, confidence_threshold),
    }
}

pub fn resolve_backend(config: &RuntimeConfig) -> ResolvedBackend {
    resolve(
        config.prefer_accelerated,
        &config.engine_path,
        &config.weights_path,
        config.image_size,
        config.confidence_threshold,
        config.half_precision,
    )
}
