use ndarray::{Array, ArrayD, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

#[cfg(feature = "trt-backend")]
pub mod trt;

/// Where ONNX Runtime executes the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

pub trait InferenceBackend {
    /// Run one forward pass over a `[1, 3, S, S]` input.
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Square input size baked into the model, if it has a fixed one.
    fn input_size(&self) -> Option<u32> {
        None
    }
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        (**self).infer(images)
    }

    fn input_size(&self) -> Option<u32> {
        (**self).input_size()
    }
}

pub struct InferenceOutput {
    pub predictions: ArrayD<f32>, // [1, 4 + num_classes, anchors] cxcywh in input pixels
}
