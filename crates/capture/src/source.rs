use crate::{CaptureError, Frame, pipe::PipeSource};
use std::{fmt, path::Path, str::FromStr};

/// Where frames come from, as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// `/dev/video{N}`
    Camera(u32),
    /// Video file or stream URL (rtsp://, http://, ...)
    Path(String),
    /// GStreamer launch description, e.g. `nvarguscamerasrc ! nvvidconv`
    Pipeline(String),
}

impl FromStr for SourceDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("video source must not be empty".to_string());
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(SourceDescriptor::Camera)
                .map_err(|e| format!("invalid camera index {s:?}: {e}"));
        }

        if s.contains('!') {
            return Ok(SourceDescriptor::Pipeline(s.to_string()));
        }

        Ok(SourceDescriptor::Path(s.to_string()))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Camera(index) => write!(f, "camera {index}"),
            SourceDescriptor::Path(path) => write!(f, "{path}"),
            SourceDescriptor::Pipeline(pipeline) => write!(f, "pipeline `{pipeline}`"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureOptions {
    /// Output size for GStreamer descriptions that do not end in their own appsink.
    pub pipeline_frame_size: (u32, u32),
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            pipeline_frame_size: (1280, 720),
        }
    }
}

/// Ordered, possibly infinite frame supply.
pub trait FrameSource {
    /// Block until the next frame. `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the underlying device or process. Safe to call more than once.
    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Open the source a descriptor points at.
pub fn open_source(
    descriptor: &SourceDescriptor,
    options: &CaptureOptions,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    tracing::info!(source = %descriptor, "Opening video source");

    match descriptor {
        #[cfg(feature = "v4l")]
        SourceDescriptor::Camera(index) => Ok(Box::new(crate::camera::V4lSource::open(*index)?)),
        #[cfg(not(feature = "v4l"))]
        SourceDescriptor::Camera(index) => Ok(Box::new(PipeSource::ffmpeg_camera(*index)?)),
        SourceDescriptor::Path(path) => {
            if !path.contains("://") && !Path::new(path).exists() {
                return Err(CaptureError::open(descriptor, "no such file"));
            }
            Ok(Box::new(PipeSource::ffmpeg(path)?))
        }
        #[cfg(feature = "gstreamer")]
        SourceDescriptor::Pipeline(pipeline) => Ok(Box::new(crate::gst::GstSource::open(
            pipeline,
            options.pipeline_frame_size,
        )?)),
        #[cfg(not(feature = "gstreamer"))]
        SourceDescriptor::Pipeline(pipeline) => {
            let _ = options;
            Err(CaptureError::open(
                pipeline,
                "built without GStreamer support (enable the gstreamer feature)",
            ))
        }
    }
}
