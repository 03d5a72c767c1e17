use crate::errors::RuntimeError;
use capture::Frame;
use std::{
    fs,
    num::NonZeroU64,
    path::{Path, PathBuf},
};

/// Writes rendered frames as numbered JPEGs every `stride` frames.
pub struct ArtifactWriter {
    dir: PathBuf,
    stride: NonZeroU64,
    written: u64,
}

/// `frame_00000042.jpg`: fixed width so names sort in frame order.
pub fn artifact_name(index: u64) -> String {
    format!("frame_{index:08}.jpg")
}

impl ArtifactWriter {
    /// Create `dir` if needed. Calling this on an existing directory is fine.
    pub fn new(dir: impl Into<PathBuf>, stride: NonZeroU64) -> Result<Self, RuntimeError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| RuntimeError::Artifact {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            dir,
            stride,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn should_write(&self, index: u64) -> bool {
        index % self.stride.get() == 0
    }

    /// Write `frame` for `index`, replacing any file left by an earlier run.
    pub fn write(&mut self, frame: &Frame, index: u64) -> Result<PathBuf, RuntimeError> {
        let path = self.dir.join(artifact_name(index));
        frame
            .save_with_format(&path, image::ImageFormat::Jpeg)
            .map_err(|e| RuntimeError::Artifact {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        self.written += 1;
        tracing::debug!(path = %path.display(), "Artifact written");
        Ok(path)
    }
}
