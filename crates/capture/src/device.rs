use crate::CaptureError;
use v4l::{
    Device, FourCC,
    control::{Control, Value},
    video::Capture,
};

pub(crate) const FOURCC_YUYV: FourCC = FourCC { repr: *b"YUYV" };
pub(crate) const FOURCC_MJPG: FourCC = FourCC { repr: *b"MJPG" };

// V4L2 control IDs (from videodev2.h)
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a0902;

// Aperture priority: auto-exposure bounded by EXPOSURE_ABSOLUTE
const V4L2_EXPOSURE_APERTURE_PRIORITY: i64 = 3;
const MAX_EXPOSURE: i64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FOURCC_YUYV,
            PixelFormat::Mjpeg => FOURCC_MJPG,
        }
    }
}

/// Pick the capture format: YUYV when offered (cheaper to decode), else MJPEG.
pub fn preferred_format(offered: &[FourCC]) -> Option<PixelFormat> {
    if offered.contains(&FOURCC_YUYV) {
        Some(PixelFormat::Yuyv)
    } else if offered.contains(&FOURCC_MJPG) {
        Some(PixelFormat::Mjpeg)
    } else {
        None
    }
}

/// Limit exposure time so moving objects stay sharp. Best effort: unsupported
/// controls are logged and skipped.
fn limit_exposure(device: &Device) {
    let controls = match device.query_controls() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to query camera controls: {}", e);
            return;
        }
    };

    if controls.iter().any(|c| c.id == V4L2_CID_EXPOSURE_AUTO) {
        if let Err(e) = device.set_control(Control {
            id: V4L2_CID_EXPOSURE_AUTO,
            value: Value::Integer(V4L2_EXPOSURE_APERTURE_PRIORITY),
        }) {
            tracing::debug!("Aperture priority mode not supported: {}", e);
        }
    }

    if let Some(ctrl) = controls.iter().find(|c| c.id == V4L2_CID_EXPOSURE_ABSOLUTE) {
        let exposure = MAX_EXPOSURE.min(ctrl.maximum);
        match device.set_control(Control {
            id: V4L2_CID_EXPOSURE_ABSOLUTE,
            value: Value::Integer(exposure),
        }) {
            Ok(()) => tracing::debug!(exposure, "Exposure limit set"),
            Err(e) => tracing::debug!("Failed to set exposure limit: {}", e),
        }
    }
}

pub struct CameraDevice {
    pub device: Device,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl CameraDevice {
    /// Open `/dev/video{index}` and negotiate a format. No retries: a busy or
    /// missing device fails right away.
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let descriptor = format!("/dev/video{index}");
        let open_err = |e: std::io::Error| CaptureError::open(&descriptor, e);

        let device = Device::new(index as usize).map_err(open_err)?;
        let caps = device.query_caps().map_err(open_err)?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(CaptureError::open(&descriptor, "not a capture device"));
        }
        tracing::info!("Camera opened: {} ({})", caps.card, caps.driver);

        let offered: Vec<FourCC> = device
            .enum_formats()
            .map_err(open_err)?
            .into_iter()
            .map(|f| f.fourcc)
            .collect();
        let pixel_format = preferred_format(&offered).ok_or_else(|| {
            CaptureError::open(
                &descriptor,
                format!("camera supports neither YUYV nor MJPEG (offers {offered:?})"),
            )
        })?;

        let mut format = device.format().map_err(open_err)?;
        format.fourcc = pixel_format.fourcc();
        let format = device.set_format(&format).map_err(open_err)?;

        tracing::info!(
            "Capture format: {}x{} {:?} ({:?})",
            format.width,
            format.height,
            format.fourcc,
            pixel_format
        );

        limit_exposure(&device);

        Ok(Self {
            device,
            width: format.width,
            height: format.height,
            pixel_format,
        })
    }
}
