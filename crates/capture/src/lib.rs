pub mod display;
pub mod errors;
pub mod launch;
pub mod pipe;
pub mod source;

#[cfg(feature = "v4l")]
pub mod camera;
#[cfg(feature = "v4l")]
pub mod decoder;
#[cfg(feature = "v4l")]
pub mod device;
#[cfg(feature = "gstreamer")]
pub mod gst;

pub use display::{Display, FfplayDisplay};
pub use errors::CaptureError;
pub use pipe::PipeSource;
pub use source::{CaptureOptions, FrameSource, SourceDescriptor, open_source};

#[cfg(feature = "v4l")]
pub use camera::V4lSource;
#[cfg(feature = "v4l")]
pub use decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder};
#[cfg(feature = "gstreamer")]
pub use gst::GstSource;

/// An RGB8 frame, row-major HWC.
pub type Frame = image::RgbImage;
