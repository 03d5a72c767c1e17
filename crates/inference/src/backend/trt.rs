use super::{InferenceBackend, InferenceOutput};
use ndarray::{Array, IxDyn};
use std::{ffi::CString, path::Path};

#[cxx::bridge]
mod ffi {
    unsafe extern "C++" {
        include!("tensorrt_backend.hpp");

        #[namespace = "engine"]
        type TensorRTBackend;

        #[namespace = "engine"]
        fn new_tensorrt_backend() -> UniquePtr<TensorRTBackend>;

        #[namespace = "engine"]
        unsafe fn load_engine(self: Pin<&mut TensorRTBackend>, path: *const c_char) -> bool;

        /// Input `[1, 3, H, W]` f32, output `[1, C, A]` f32, both host memory.
        #[namespace = "engine"]
        unsafe fn infer_raw(
            self: Pin<&mut TensorRTBackend>,
            images: *const f32,
            predictions: *mut f32,
        ) -> bool;

        #[namespace = "engine"]
        fn input_height(self: &TensorRTBackend) -> i32;
        #[namespace = "engine"]
        fn input_width(self: &TensorRTBackend) -> i32;
        #[namespace = "engine"]
        fn output_channels(self: &TensorRTBackend) -> i32;
        #[namespace = "engine"]
        fn output_anchors(self: &TensorRTBackend) -> i32;
    }
}

pub struct TrtBackend {
    inner: cxx::UniquePtr<ffi::TensorRTBackend>,
    input_shape: [usize; 4],
    output_shape: [usize; 3],
}

impl TrtBackend {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut inner = ffi::new_tensorrt_backend();

        if inner.is_null() {
            anyhow::bail!("Failed to create TensorRT backend instance");
        }

        let c_path = CString::new(path.to_string_lossy().as_bytes())?;

        if !unsafe { inner.pin_mut().load_engine(c_path.as_ptr()) } {
            anyhow::bail!("Failed to load TensorRT engine from {}", path.display());
        }

        let dims = [
            inner.input_height(),
            inner.input_width(),
            inner.output_channels(),
            inner.output_anchors(),
        ];
        if dims.iter().any(|&d| d <= 0) {
            anyhow::bail!("Engine has dynamic or invalid shapes: {dims:?}");
        }
        let [h, w, c, a] = dims.map(|d| d as usize);

        tracing::info!(
            engine = %path.display(),
            input = ?[1, 3, h, w],
            output = ?[1, c, a],
            "TensorRT engine loaded"
        );

        Ok(Self {
            inner,
            input_shape: [1, 3, h, w],
            output_shape: [1, c, a],
        })
    }
}

impl InferenceBackend for TrtBackend {
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        if images.shape() != self.input_shape {
            anyhow::bail!(
                "Input shape {:?} does not match engine input {:?}",
                images.shape(),
                self.input_shape
            );
        }
        let images = images.as_standard_layout();

        let mut predictions = Array::<f32, IxDyn>::zeros(IxDyn(&self.output_shape));

        let success = unsafe {
            self.inner
                .pin_mut()
                .infer_raw(images.as_ptr(), predictions.as_mut_ptr())
        };

        if !success {
            anyhow::bail!("TensorRT inference failed");
        }

        Ok(InferenceOutput { predictions })
    }

    fn input_size(&self) -> Option<u32> {
        Some(self.input_shape[2] as u32)
    }
}
