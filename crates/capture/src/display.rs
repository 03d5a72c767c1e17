use crate::{CaptureError, Frame};
use std::{
    io::{self, Write},
    process::{Child, ChildStdin, Command, Stdio},
};

/// Live output window.
pub trait Display {
    /// Show a frame. Blocks until the window accepted it.
    fn present(&mut self, frame: &Frame) -> Result<(), CaptureError>;

    /// Non-blocking: has the user asked to quit (quit key, window closed)?
    fn quit_requested(&mut self) -> bool;

    /// Close the window. Safe to call more than once.
    fn release(&mut self);
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn present(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        (**self).present(frame)
    }

    fn quit_requested(&mut self) -> bool {
        (**self).quit_requested()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Window backed by an `ffplay` process reading raw RGB24 on stdin.
///
/// ffplay exits when `q`/`Esc` is pressed or the window is closed; either shows up
/// as a quit request on the next poll.
pub struct FfplayDisplay {
    title: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    size: Option<(u32, u32)>,
    closed: bool,
}

impl FfplayDisplay {
    /// Check that ffplay is runnable. The window itself opens with the first frame,
    /// once the frame size is known.
    pub fn open(title: &str) -> Result<Self, CaptureError> {
        let status = Command::new("ffplay")
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| CaptureError::Display(format!("failed to start ffplay: {e}")))?;

        if !status.success() {
            return Err(CaptureError::Display(format!(
                "ffplay -version exited with {status}"
            )));
        }

        Ok(Self {
            title: title.to_string(),
            child: None,
            stdin: None,
            size: None,
            closed: false,
        })
    }

    fn spawn_window(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        let mut child = Command::new("ffplay")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-window_title")
            .arg(&self.title)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pixel_format")
            .arg("rgb24")
            .arg("-video_size")
            .arg(format!("{width}x{height}"))
            .arg("-fflags")
            .arg("nobuffer")
            .arg("-i")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CaptureError::Display(format!("failed to start ffplay: {e}")))?;

        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.size = Some((width, height));

        tracing::info!(title = %self.title, width, height, "Display window opened");
        Ok(())
    }
}

impl Display for FfplayDisplay {
    fn present(&mut self, frame: &Frame) -> Result<(), CaptureError> {
        if self.closed {
            return Ok(());
        }

        let dims = frame.dimensions();
        match self.size {
            None => self.spawn_window(dims.0, dims.1)?,
            Some(size) if size != dims => {
                return Err(CaptureError::Display(format!(
                    "frame size changed from {}x{} to {}x{}",
                    size.0, size.1, dims.0, dims.1
                )));
            }
            Some(_) => {}
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(CaptureError::Display("ffplay stdin unavailable".to_string()));
        };

        match stdin.write_all(frame.as_raw()) {
            Ok(()) => Ok(()),
            // The window went away under us
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.closed = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn quit_requested(&mut self) -> bool {
        if !self.closed
            && let Some(child) = self.child.as_mut()
            && let Ok(Some(status)) = child.try_wait()
        {
            tracing::debug!(%status, "ffplay exited");
            self.closed = true;
        }
        self.closed
    }

    fn release(&mut self) {
        // closing stdin lets ffplay drain and exit on its own
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(title = %self.title, "Display window closed");
        }
    }
}

impl Drop for FfplayDisplay {
    fn drop(&mut self) {
        self.release();
    }
}
