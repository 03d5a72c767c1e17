use super::{ExecutionProvider, InferenceBackend, InferenceOutput};
use anyhow::Context;
use half::f16;
use ndarray::{Array, ArrayD, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

pub struct OrtBackend {
    session: Session,
    /// Feed FP16 input. Cleared after the first run if the model wants FP32.
    half_input: bool,
    checked_input_type: bool,
}

impl OrtBackend {
    /// Load ONNX weights on the given execution provider.
    ///
    /// CUDA registration is best effort: without a usable GPU the session runs on CPU.
    pub fn load(
        path: &Path,
        provider: ExecutionProvider,
        half_precision: bool,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to create session from {}", path.display()))?;

        tracing::info!(model = %path.display(), half_precision, "ONNX model loaded");
        Ok(Self {
            session,
            half_input: half_precision,
            checked_input_type: false,
        })
    }

    fn run_f32(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(images.view())?])?;
        extract_predictions(&outputs[0])
    }

    fn run_f16(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>> {
        let half_images = images.mapv(f16::from_f32);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(half_images.view())?])?;
        extract_predictions(&outputs[0])
    }
}

/// FP16 exports may keep FP16 outputs; widen them.
fn extract_predictions(value: &ort::value::DynValue) -> anyhow::Result<ArrayD<f32>> {
    if let Ok(view) = value.try_extract_array::<f32>() {
        return Ok(view.into_owned());
    }
    let view = value
        .try_extract_array::<f16>()
        .context("Model output is neither f32 nor f16")?;
    Ok(view.mapv(f16::to_f32))
}

impl InferenceBackend for OrtBackend {
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let predictions = if self.half_input {
            match self.run_f16(images) {
                Ok(predictions) => predictions,
                Err(e) if !self.checked_input_type => {
                    // precision is a property of the exported graph, not a runtime switch
                    tracing::warn!(
                        error = %e,
                        "Model rejected FP16 input, running in FP32"
                    );
                    self.half_input = false;
                    self.run_f32(images)?
                }
                Err(e) => return Err(e),
            }
        } else {
            self.run_f32(images)?
        };
        self.checked_input_type = true;

        Ok(InferenceOutput { predictions })
    }
}
