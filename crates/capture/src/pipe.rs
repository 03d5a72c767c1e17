use crate::{CaptureError, Frame, FrameSource};
use std::{
    io::{self, Read},
    process::{Child, ChildStdout, Command, Stdio},
};

/// Frames read as raw RGB24 from an `ffmpeg` subprocess.
///
/// Reads are synchronous: one frame is pulled from the pipe per call, nothing is
/// decoded ahead on a background thread.
pub struct PipeSource {
    program: &'static str,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    width: u32,
    height: u32,
}

enum FfmpegInput<'a> {
    Uri(&'a str),
    Camera(u32),
}

impl FfmpegInput<'_> {
    fn apply(&self, cmd: &mut Command) {
        match self {
            FfmpegInput::Uri(uri) => {
                cmd.arg(uri);
            }
            FfmpegInput::Camera(index) => {
                cmd.arg("-f")
                    .arg("video4linux2")
                    .arg(format!("/dev/video{index}"));
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            FfmpegInput::Uri(uri) => uri.to_string(),
            FfmpegInput::Camera(index) => format!("/dev/video{index}"),
        }
    }
}

impl PipeSource {
    /// Decode a file or stream URL with ffmpeg.
    pub fn ffmpeg(uri: &str) -> Result<Self, CaptureError> {
        Self::spawn_ffmpeg(FfmpegInput::Uri(uri))
    }

    /// Capture `/dev/video{index}` through ffmpeg's V4L2 demuxer.
    pub fn ffmpeg_camera(index: u32) -> Result<Self, CaptureError> {
        Self::spawn_ffmpeg(FfmpegInput::Camera(index))
    }

    fn spawn_ffmpeg(input: FfmpegInput<'_>) -> Result<Self, CaptureError> {
        let descriptor = input.describe();
        let (width, height) = probe_dimensions(&input)?;

        tracing::info!(source = %descriptor, width, height, "Probed video stream");

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin");
        if matches!(input, FfmpegInput::Camera(_)) {
            cmd.arg("-f").arg("video4linux2").arg("-i");
            cmd.arg(&descriptor);
        } else {
            cmd.arg("-i").arg(&descriptor);
        }
        cmd.arg("-an")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");

        Self::spawn("ffmpeg", cmd, &descriptor, width, height)
    }

    fn spawn(
        program: &'static str,
        mut cmd: Command,
        descriptor: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, CaptureError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| CaptureError::open(descriptor, format!("failed to start {program}: {e}")))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CaptureError::open(descriptor, format!("failed to capture {program} stdout"))
        })?;

        tracing::debug!(program, pid = child.id(), "Decoder process started");

        Ok(Self {
            program,
            child: Some(child),
            stdout: Some(stdout),
            width,
            height,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buffer = vec![0u8; frame_bytes(self.width, self.height)];
        match read_full_frame(stdout, &mut buffer)? {
            true => Frame::from_raw(self.width, self.height, buffer)
                .map(Some)
                .ok_or_else(|| CaptureError::Decode("frame buffer size mismatch".to_string())),
            false => Ok(None),
        }
    }

    /// Kill (if still running) and wait for the decoder, returning its exit status text.
    fn reap(&mut self) -> String {
        self.stdout = None;
        match self.child.take() {
            Some(mut child) => {
                let _ = child.kill();
                match child.wait() {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                }
            }
            None => "already released".to_string(),
        }
    }
}

/// Size of one packed RGB24 frame.
fn frame_bytes(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Fill `buffer` with one frame. `Ok(false)` on a clean end of stream; a partial
/// trailing frame counts as end of stream too.
fn read_full_frame(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buffer) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

impl FrameSource for PipeSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.read_frame()
    }

    fn release(&mut self) {
        if self.child.is_some() {
            let status = self.reap();
            tracing::debug!(program = self.program, %status, "Decoder process released");
        }
    }
}

impl Drop for PipeSource {
    fn drop(&mut self) {
        self.release();
    }
}

/// Ask ffprobe for the first video stream's size.
fn probe_dimensions(input: &FfmpegInput<'_>) -> Result<(u32, u32), CaptureError> {
    let descriptor = input.describe();

    let mut cmd = Command::new("ffprobe");
    cmd.arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height")
        .arg("-of")
        .arg("csv=p=0:s=x");
    input.apply(&mut cmd);

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CaptureError::open(&descriptor, format!("failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::open(&descriptor, stderr.trim()));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| CaptureError::open(&descriptor, "no video stream found"))
}

fn parse_probe_output(stdout: &str) -> Option<(u32, u32)> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().trim_end_matches('x').parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
