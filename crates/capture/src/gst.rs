use crate::{
    CaptureError, Frame, FrameSource,
    launch::{APPSINK_NAME, launch_description},
};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

/// How long opening waits for the pipeline to preroll.
const PREROLL_TIMEOUT_SECS: u64 = 10;

/// Frames pulled from the appsink of a GStreamer launch description.
pub struct GstSource {
    description: String,
    pipeline: gst::Element,
    appsink: gst_app::AppSink,
    released: bool,
}

impl GstSource {
    /// Parse and start `description`. Descriptions ending in `appsink` keep their sink;
    /// others are scaled to `frame_size` and given one.
    pub fn open(description: &str, frame_size: (u32, u32)) -> Result<Self, CaptureError> {
        gst::init().map_err(|e| CaptureError::open(description, e))?;

        let launch = launch_description(description, frame_size);
        tracing::debug!(%launch, "Parsing GStreamer pipeline");

        let pipeline =
            gst::parse::launch(&launch).map_err(|e| CaptureError::open(description, e))?;
        let appsink = find_appsink(&pipeline)
            .ok_or_else(|| CaptureError::open(description, "pipeline has no appsink"))?;

        let mut source = Self {
            description: description.to_string(),
            pipeline,
            appsink,
            released: false,
        };
        source.start()?;
        Ok(source)
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        if let Err(e) = self.pipeline.set_state(gst::State::Playing) {
            let reason = self.bus_error().unwrap_or_else(|| e.to_string());
            self.release();
            return Err(CaptureError::open(&self.description, reason));
        }

        // live sources report NoPreroll, which is fine
        let (result, _, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
        if let Err(e) = result {
            let reason = self.bus_error().unwrap_or_else(|| e.to_string());
            self.release();
            return Err(CaptureError::open(&self.description, reason));
        }

        tracing::info!(pipeline = %self.description, "GStreamer pipeline playing");
        Ok(())
    }

    /// First error posted on the pipeline bus, if any.
    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }
}

fn find_appsink(pipeline: &gst::Element) -> Option<gst_app::AppSink> {
    let bin = pipeline.downcast_ref::<gst::Bin>()?;
    if let Some(named) = bin.by_name(APPSINK_NAME) {
        return named.downcast::<gst_app::AppSink>().ok();
    }
    bin.iterate_sinks()
        .into_iter()
        .filter_map(Result::ok)
        .find_map(|sink| sink.downcast::<gst_app::AppSink>().ok())
}

/// Copy a packed RGB sample into a `Frame`, dropping row padding.
fn frame_from_sample(sample: &gst::Sample) -> Result<Frame, CaptureError> {
    let caps = sample
        .caps()
        .ok_or_else(|| CaptureError::Decode("sample without caps".to_string()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| CaptureError::Decode(format!("unsupported caps: {e}")))?;
    if info.format() != gst_video::VideoFormat::Rgb {
        return Err(CaptureError::Decode(format!(
            "expected RGB samples, got {:?}",
            info.format()
        )));
    }

    let buffer = sample
        .buffer()
        .ok_or_else(|| CaptureError::Decode("sample without buffer".to_string()))?;
    let map = buffer
        .map_readable()
        .map_err(|e| CaptureError::Decode(format!("failed to map buffer: {e}")))?;

    let (width, height) = (info.width(), info.height());
    let stride = info.stride()[0] as usize;
    let pixels = copy_rows(map.as_slice(), width as usize * 3, stride, height as usize)?;

    Frame::from_raw(width, height, pixels)
        .ok_or_else(|| CaptureError::Decode("frame buffer size mismatch".to_string()))
}

/// Pack `rows` rows of `row_bytes` each out of a buffer laid out every `stride` bytes.
pub(crate) fn copy_rows(
    data: &[u8],
    row_bytes: usize,
    stride: usize,
    rows: usize,
) -> Result<Vec<u8>, CaptureError> {
    if stride < row_bytes || (rows > 0 && data.len() < stride * (rows - 1) + row_bytes) {
        return Err(CaptureError::Decode(format!(
            "buffer of {} bytes too small for {rows} rows of {row_bytes} (stride {stride})",
            data.len()
        )));
    }
    let mut pixels = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_bytes]);
    }
    Ok(pixels)
}

impl FrameSource for GstSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released || self.appsink.is_eos() {
            return Ok(None);
        }

        match self.appsink.pull_sample() {
            Ok(sample) => frame_from_sample(&sample).map(Some),
            Err(_) if self.appsink.is_eos() => Ok(None),
            Err(e) => {
                let reason = self.bus_error().unwrap_or_else(|| e.to_string());
                Err(CaptureError::Io(std::io::Error::other(reason)))
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(error = %e, "Failed to stop GStreamer pipeline");
        }
        tracing::debug!(pipeline = %self.description, "GStreamer pipeline released");
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        self.release();
    }
}
