use crate::CaptureError;
use common::span;

/// Turns raw V4L2 buffers into packed RGB.
pub trait FrameDecoder: Send {
    /// Decode one buffer to RGB (3 bytes per pixel). The slice borrows the
    /// decoder's scratch buffer and is overwritten by the next call.
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<&[u8], CaptureError>;
}

/// YUYV (YUV 4:2:2): 2 pixels packed in 4 bytes `[Y0, U, Y1, V]`.
#[derive(Default)]
pub struct YuyvDecoder {
    rgb_buffer: Vec<u8>,
}

impl YuyvDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for YuyvDecoder {
    fn decode(&mut self, raw: &[u8], width: u32, height: u32) -> Result<&[u8], CaptureError> {
        let _s = span!("decode_yuyv");

        let bytes_per_row = (width * 2) as usize;
        let rgb_size = (width * height * 3) as usize;
        if height == 0 || raw.len() < bytes_per_row * height as usize {
            return Err(CaptureError::Decode(format!(
                "YUYV buffer of {} bytes too short for {width}x{height}",
                raw.len()
            )));
        }

        self.rgb_buffer.resize(rgb_size, 0);

        // drivers may pad rows
        let stride = raw.len() / height as usize;

        let mut out_idx = 0;
        for row in 0..height as usize {
            let row_start = row * stride;
            let row_data = &raw[row_start..row_start + bytes_per_row];

            for chunk in row_data.chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601, 8-bit fixed point
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                for y in [y0, y1] {
                    self.rgb_buffer[out_idx] = (y + rv).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 1] = (y - gu).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 2] = (y + bu).clamp(0, 255) as u8;
                    out_idx += 3;
                }
            }
        }

        Ok(&self.rgb_buffer[..rgb_size])
    }
}

/// MJPEG via libjpeg-turbo.
pub struct MjpegDecoder {
    decompressor: turbojpeg::Decompressor,
    rgb_buffer: Vec<u8>,
}

impl MjpegDecoder {
    pub fn new() -> Result<Self, CaptureError> {
        let decompressor = turbojpeg::Decompressor::new()
            .map_err(|e| CaptureError::Decode(format!("failed to init libjpeg-turbo: {e}")))?;
        Ok(Self {
            decompressor,
            rgb_buffer: Vec::new(),
        })
    }
}

impl FrameDecoder for MjpegDecoder {
    // JPEG headers carry their own size
    fn decode(&mut self, raw: &[u8], _width: u32, _height: u32) -> Result<&[u8], CaptureError> {
        let _s = span!("decode_mjpeg");

        let header = self
            .decompressor
            .read_header(raw)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;
        let (width, height) = (header.width, header.height);
        let rgb_size = width * height * 3;

        self.rgb_buffer.resize(rgb_size, 0);

        let output = turbojpeg::Image {
            pixels: &mut self.rgb_buffer[..rgb_size],
            width,
            pitch: width * 3,
            height,
            format: turbojpeg::PixelFormat::RGB,
        };

        self.decompressor
            .decompress(raw, output)
            .map_err(|e| CaptureError::Decode(e.to_string()))?;

        Ok(&self.rgb_buffer[..rgb_size])
    }
}
