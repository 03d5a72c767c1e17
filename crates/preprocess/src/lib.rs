pub mod cpu;

pub use cpu::CpuPreProcessor;

/// Default square model input (YOLO exports use 640x640).
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Geometry of the letterbox applied to a frame, needed to map model-space
/// boxes back onto the source frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Uniform scale from source pixels to model-input pixels
    pub scale: f32,
    /// Horizontal padding (model-input pixels)
    pub offset_x: f32,
    /// Vertical padding (model-input pixels)
    pub offset_y: f32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl Letterbox {
    /// Map a model-space point back to source-frame pixels, clamped to the frame.
    #[inline]
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.offset_x) / self.scale).clamp(0.0, self.orig_width as f32);
        let sy = ((y - self.offset_y) / self.scale).clamp(0.0, self.orig_height as f32);
        (sx, sy)
    }
}
