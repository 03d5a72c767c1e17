use crate::{
    backend::{ExecutionProvider, InferenceBackend, InferenceOutput},
    errors::RuntimeError,
    overlay,
    processing::post::{Detection, PostProcessor},
    resolver::{Backend, InferenceOptions, ResolvedBackend},
};
use capture::Frame;
use common::span;
use preprocess::CpuPreProcessor;
use std::path::Path;

/// Finds objects in frames and draws them.
pub trait Detector {
    fn infer(
        &mut self,
        frame: &Frame,
        options: &InferenceOptions,
    ) -> Result<Vec<Detection>, RuntimeError>;

    /// Annotated copy of `frame`.
    fn render(&self, frame: &Frame, detections: &[Detection]) -> Frame;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn infer(
        &mut self,
        frame: &Frame,
        options: &InferenceOptions,
    ) -> Result<Vec<Detection>, RuntimeError> {
        (**self).infer(frame, options)
    }

    fn render(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        (**self).render(frame, detections)
    }
}

/// Letterbox, forward pass, decode + NMS.
pub struct YoloDetector<B: InferenceBackend> {
    backend: B,
    preprocessor: CpuPreProcessor,
    postprocessor: PostProcessor,
}

impl<B: InferenceBackend> YoloDetector<B> {
    pub fn new(backend: B, image_size: u32, iou_threshold: f32) -> Self {
        let input_size = match backend.input_size() {
            Some(fixed) if fixed != image_size => {
                tracing::warn!(
                    requested = image_size,
                    engine = fixed,
                    "Model input size is fixed, ignoring requested image size"
                );
                fixed
            }
            Some(fixed) => fixed,
            None => image_size,
        };

        Self {
            backend,
            preprocessor: CpuPreProcessor::new(input_size),
            postprocessor: PostProcessor::new(iou_threshold),
        }
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    fn infer(
        &mut self,
        frame: &Frame,
        options: &InferenceOptions,
    ) -> Result<Vec<Detection>, RuntimeError> {
        let _s = span!("detect");

        if self.backend.input_size().is_none()
            && options.image_size != self.preprocessor.input_size()
        {
            self.preprocessor = CpuPreProcessor::new(options.image_size);
        }

        let (input, letterbox) = self
            .preprocessor
            .preprocess(frame.as_raw(), frame.width(), frame.height())
            .map_err(|e| RuntimeError::Inference(format!("{e:#}")))?;

        let InferenceOutput { predictions } = {
            let _infer_span = tracing::info_span!("model_inference").entered();
            self.backend
                .infer(&input)
                .map_err(|e| RuntimeError::Inference(format!("{e:#}")))?
        };

        self.postprocessor
            .decode(&predictions.view(), &letterbox, options.confidence_threshold)
            .map_err(|e| RuntimeError::Inference(format!("{e:#}")))
    }

    fn render(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        overlay::draw_detections(frame, detections)
    }
}

/// Build the detector for a resolved artifact.
///
/// Fails with `ResourceNotFound` when the artifact is missing, before anything is loaded.
pub fn build_detector(
    resolved: &ResolvedBackend,
    device: ExecutionProvider,
    iou_threshold: f32,
) -> Result<Box<dyn Detector>, RuntimeError> {
    let path = &resolved.artifact_path;
    if !path.is_file() {
        return Err(RuntimeError::ResourceNotFound { path: path.clone() });
    }

    let image_size = resolved.options.image_size;
    match resolved.backend {
        Backend::Accelerated => load_engine(path, image_size, iou_threshold),
        Backend::Portable { half_precision } => {
            load_onnx(path, device, half_precision, image_size, iou_threshold)
        }
    }
}

fn model_load(path: &Path, e: anyhow::Error) -> RuntimeError {
    RuntimeError::ModelLoad {
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    }
}

#[cfg(feature = "trt-backend")]
fn load_engine(
    path: &Path,
    image_size: u32,
    iou_threshold: f32,
) -> Result<Box<dyn Detector>, RuntimeError> {
    let backend = crate::backend::trt::TrtBackend::load(path).map_err(|e| model_load(path, e))?;
    Ok(Box::new(YoloDetector::new(backend, image_size, iou_threshold)))
}

#[cfg(not(feature = "trt-backend"))]
fn load_engine(
    path: &Path,
    _image_size: u32,
    _iou_threshold: f32,
) -> Result<Box<dyn Detector>, RuntimeError> {
    Err(RuntimeError::AcceleratorUnsupported {
        path: path.to_path_buf(),
    })
}

#[cfg(feature = "ort-backend")]
fn load_onnx(
    path: &Path,
    device: ExecutionProvider,
    half_precision: bool,
    image_size: u32,
    iou_threshold: f32,
) -> Result<Box<dyn Detector>, RuntimeError> {
    let backend = crate::backend::ort::OrtBackend::load(path, device, half_precision)
        .map_err(|e| model_load(path, e))?;
    Ok(Box::new(YoloDetector::new(backend, image_size, iou_threshold)))
}

#[cfg(not(feature = "ort-backend"))]
fn load_onnx(
    path: &Path,
    _device: ExecutionProvider,
    _half_precision: bool,
    _image_size: u32,
    _iou_threshold: f32,
) -> Result<Box<dyn Detector>, RuntimeError> {
    Err(model_load(
        path,
        anyhow::anyhow!("built without the ort-backend feature"),
    ))
}
