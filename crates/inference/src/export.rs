//! One-shot ONNX -> TensorRT engine conversion through `trtexec`.
//!
//! Never called by the inference loop: the resolver only checks whether the engine exists.

use crate::errors::RuntimeError;
use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub weights: PathBuf,
    pub image_size: u32,
    pub output: PathBuf,
    /// ONNX input tensor, pinned to `1x3xSxS`
    pub input_name: String,
    pub workspace_mib: Option<u32>,
}

impl ExportRequest {
    /// Engine goes next to the weights unless `output` is given.
    pub fn new(weights: impl Into<PathBuf>, image_size: u32, output: Option<PathBuf>) -> Self {
        let weights = weights.into();
        let output = output.unwrap_or_else(|| weights.with_extension("engine"));
        Self {
            weights,
            image_size,
            output,
            input_name: "images".to_string(),
            workspace_mib: None,
        }
    }

    pub fn trtexec_args(&self) -> Vec<String> {
        let shape = format!(
            "{}:1x3x{}x{}",
            self.input_name, self.image_size, self.image_size
        );
        let mut args = vec![
            format!("--onnx={}", self.weights.display()),
            format!("--saveEngine={}", self.output.display()),
            "--fp16".to_string(),
            format!("--minShapes={shape}"),
            format!("--optShapes={shape}"),
            format!("--maxShapes={shape}"),
        ];
        if let Some(mib) = self.workspace_mib {
            args.push(format!("--memPoolSize=workspace:{mib}M"));
        }
        args
    }
}

/// `$TENSORRT_ROOT/bin/trtexec` when present, else `trtexec` from `PATH`.
pub fn trtexec_path() -> PathBuf {
    std::env::var_os("TENSORRT_ROOT")
        .map(|root| PathBuf::from(root).join("bin/trtexec"))
        .filter(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from("trtexec"))
}

pub fn export(request: &ExportRequest) -> Result<PathBuf, RuntimeError> {
    export_with(&trtexec_path(), request)
}

/// Run `program` with trtexec arguments. Blocking, no retry.
pub fn export_with(program: &Path, request: &ExportRequest) -> Result<PathBuf, RuntimeError> {
    if request.image_size == 0 {
        return Err(RuntimeError::InvalidConfig(
            "imgsz must be a positive integer".to_string(),
        ));
    }
    if !request.weights.is_file() {
        return Err(RuntimeError::ResourceNotFound {
            path: request.weights.clone(),
        });
    }
    if let Some(parent) = request.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            RuntimeError::ExportFailed(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    tracing::info!(
        weights = %request.weights.display(),
        engine = %request.output.display(),
        image_size = request.image_size,
        "Exporting TensorRT engine (FP16)"
    );

    let status = Command::new(program)
        .args(request.trtexec_args())
        .status()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RuntimeError::ExportFailed(format!(
                "{} not found; install TensorRT or set TENSORRT_ROOT",
                program.display()
            )),
            _ => RuntimeError::ExportFailed(format!("failed to run {}: {e}", program.display())),
        })?;

    if !status.success() {
        return Err(RuntimeError::ExportFailed(format!(
            "{} exited with {status}",
            program.display()
        )));
    }
    if !request.output.is_file() {
        return Err(RuntimeError::ExportFailed(format!(
            "{} reported success but wrote no engine at {}",
            program.display(),
            request.output.display()
        )));
    }

    tracing::info!(engine = %request.output.display(), "Export finished");
    Ok(request.output.clone())
}
