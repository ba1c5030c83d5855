// src/recorder/sink_mjpeg.rs
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::MediaError;

use super::ClipWriter;

/// Motion-JPEG clip: the JPEG frames back to back, as players expect for
/// `.mjpeg` files.
pub struct MjpegClipWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl MjpegClipWriter {
    /// Opens `path` for appending; an existing file keeps its frames.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MediaError::io(&path, e))?;

        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ClipWriter for MjpegClipWriter {
    fn write_frame(&mut self, jpeg: &[u8]) -> Result<(), MediaError> {
        match self.out.as_mut() {
            Some(out) => out.write_all(jpeg).map_err(|e| MediaError::io(&self.path, e)),
            None => Err(MediaError::io(
                &self.path,
                std::io::Error::other("clip already finished"),
            )),
        }
    }

    fn finish(&mut self) -> Result<(), MediaError> {
        if let Some(mut out) = self.out.take() {
            out.flush().map_err(|e| MediaError::io(&self.path, e))?;
            out.get_ref()
                .sync_all()
                .map_err(|e| MediaError::io(&self.path, e))?;
        }
        Ok(())
    }
}

impl Drop for MjpegClipWriter {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
