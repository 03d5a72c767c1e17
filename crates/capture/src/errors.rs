use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open video source {descriptor}: {reason}")]
    Open { descriptor: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Display error: {0}")]
    Display(String),
}

impl CaptureError {
    pub fn open(descriptor: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        CaptureError::Open {
            descriptor: descriptor.to_string(),
            reason: reason.to_string(),
        }
    }
}
