use crate::{
    CaptureError, Frame, FrameSource,
    decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder},
    device::{CameraDevice, PixelFormat},
};
use v4l::{
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
};

const BUFFER_COUNT: u32 = 4;

/// Camera read straight from V4L2 memory-mapped buffers.
pub struct V4lSource {
    index: u32,
    stream: Option<Stream<'static>>,
    decoder: Box<dyn FrameDecoder>,
    width: u32,
    height: u32,
    frames: u64,
}

impl V4lSource {
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let camera = CameraDevice::open(index)?;

        let decoder: Box<dyn FrameDecoder> = match camera.pixel_format {
            PixelFormat::Yuyv => Box::new(YuyvDecoder::new()),
            PixelFormat::Mjpeg => Box::new(MjpegDecoder::new()?),
        };

        let stream = Stream::with_buffers(&camera.device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| {
                CaptureError::open(format!("/dev/video{index}"), format!("stream setup: {e}"))
            })?;

        Ok(Self {
            index,
            stream: Some(stream),
            decoder,
            width: camera.width,
            height: camera.height,
            frames: 0,
        })
    }
}

impl FrameSource for V4lSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let (raw, _meta) = stream.next()?;
        let rgb = self.decoder.decode(raw, self.width, self.height)?;

        // MJPEG frames may not match the negotiated size
        let pixels = rgb.len() / 3;
        if pixels != (self.width * self.height) as usize {
            return Err(CaptureError::Decode(format!(
                "decoded {pixels} pixels, expected {}x{}",
                self.width, self.height
            )));
        }

        self.frames += 1;
        Frame::from_raw(self.width, self.height, rgb.to_vec())
            .map(Some)
            .ok_or_else(|| CaptureError::Decode("frame buffer size mismatch".to_string()))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(camera = self.index, frames = self.frames, "Camera released");
        }
    }
}

impl Drop for V4lSource {
    fn drop(&mut self) {
        self.release();
    }
}
