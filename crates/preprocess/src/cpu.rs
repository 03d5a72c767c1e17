use crate::{DEFAULT_INPUT_SIZE, Letterbox};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Letterboxes RGB frames into a square `[1, 3, S, S]` tensor scaled to 0..1.
pub struct CpuPreProcessor {
    input_size: u32,
    letterboxed_buffer: Vec<u8>,
    resizer: Resizer,
}

impl CpuPreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size * input_size * 3) as usize],
            resizer: Resizer::new(),
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Preprocess an RGB (HWC) frame.
    ///
    /// Returns the model input tensor and the letterbox used to produce it.
    pub fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<(Array<f32, IxDyn>, Letterbox)> {
        let _s = span!("preprocess_frame");

        tracing::trace!(
            width,
            height,
            pixel_bytes = pixels.len(),
            "Preprocessing frame dimensions"
        );

        if width == 0 || height == 0 {
            anyhow::bail!("Empty frame: {}x{}", width, height);
        }

        let expected_size = (width * height * 3) as usize;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {}, got {} bytes",
                expected_size,
                pixels.len()
            );
        }

        let letterbox = self.resize_and_letterbox(pixels, width, height)?;
        let input = self.normalize()?;

        Ok((input, letterbox))
    }

    fn resize_and_letterbox(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<Letterbox> {
        let _s = span!("resize_and_letterbox");

        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, size);
        let new_height = ((height as f32 * scale) as u32).clamp(1, size);

        let offset_x = (size - new_width) / 2;
        let offset_y = (size - new_height) / 2;

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = size * 3;
        let row_bytes = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        Ok(Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
            orig_width: width,
            orig_height: height,
        })
    }

    /// HWC u8 -> CHW f32 in 0..1 (YOLO exports expect no mean/std normalization).
    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let side = self.input_size as usize;
        let spatial = side * side;
        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, side, side]), output)?)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_follows_input_size() {
        let pixels = vec![
            255, 0, 0, // Red pixel
            0, 255, 0, // Green pixel
            0, 0, 255, // Blue pixel
            255, 255, 255, // White pixel
        ];

        let mut preprocessor = CpuPreProcessor::new(320);
        let (output, _) = preprocessor.preprocess(&pixels, 2, 2).unwrap();
        assert_eq!(output.shape(), &[1, 3, 320, 320]);
    }

    #[test]
    fn test_buffer_size_mismatch_detection() {
        let pixels = vec![0u8; 200]; // Wrong size for 10x10

        let mut preprocessor = CpuPreProcessor::default();
        let result = preprocessor.preprocess(&pixels, 10, 10);

        assert!(result.is_err(), "Size mismatch should return error");
        assert!(
            result.unwrap_err().to_string().contains("mismatch"),
            "Error should mention mismatch"
        );
    }

    #[test]
    fn test_empty_frame_rejected() {
        let mut preprocessor = CpuPreProcessor::default();
        assert!(preprocessor.preprocess(&[], 0, 0).is_err());
    }

    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        // 800x600 image (4:3 aspect ratio)
        let pixels = vec![128u8; 800 * 600 * 3];

        let mut preprocessor = CpuPreProcessor::new(640);
        let (output, letterbox) = preprocessor.preprocess(&pixels, 800, 600).unwrap();

        // min(640/800, 640/600) = 0.8 -> 640x480, padded 80px top and bottom
        assert_eq!(letterbox.scale, 0.8);
        assert_eq!(letterbox.offset_x, 0.0, "X offset should be 0 for wide image");
        assert_eq!(letterbox.offset_y, 80.0, "Y offset should center vertically");
        assert_eq!(output.shape(), &[1, 3, 640, 640]);

        // Padding rows carry the letterbox color
        let pad = output[[0, 0, 10, 320]];
        assert!((pad - LETTERBOX_COLOR as f32 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_values_scaled_to_unit_range() {
        let pixels = vec![255u8; 64 * 64 * 3];

        let mut preprocessor = CpuPreProcessor::new(64);
        let (output, _) = preprocessor.preprocess(&pixels, 64, 64).unwrap();

        assert!(output.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((output[[0, 1, 32, 32]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_maps_back_to_source() {
        let letterbox = Letterbox {
            scale: 0.8,
            offset_x: 0.0,
            offset_y: 80.0,
            orig_width: 800,
            orig_height: 600,
        };

        let (x, y) = letterbox.to_source(320.0, 320.0);
        assert!((x - 400.0).abs() < 1e-3);
        assert!((y - 300.0).abs() < 1e-3);

        // Points inside the padding clamp to the frame edge
        let (_, y) = letterbox.to_source(0.0, 0.0);
        assert_eq!(y, 0.0);
    }
}
