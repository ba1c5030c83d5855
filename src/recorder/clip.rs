// src/recorder/clip.rs
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::core::timestamp::file_stamp;
use crate::core::{CameraId, MediaError};

use super::{CLIP_EXTENSION, ClipWriter};

/// The one open recording file of a camera.
pub struct Clip {
    pub path: PathBuf,
    pub started_at: DateTime<Local>,
    pub frame_count: u64,
    pub writer: Box<dyn ClipWriter>,
}

impl Clip {
    pub fn new(path: PathBuf, started_at: DateTime<Local>, writer: Box<dyn ClipWriter>) -> Self {
        Self {
            path,
            started_at,
            frame_count: 0,
            writer,
        }
    }

    pub fn append(&mut self, jpeg: &[u8]) -> Result<(), MediaError> {
        self.writer.write_frame(jpeg)?;
        self.frame_count += 1;
        Ok(())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `<dir>/camN_YYYYMMDD_HHMMSS.<ext>`
pub fn media_path(dir: &Path, camera: CameraId, at: &DateTime<Local>, ext: &str) -> PathBuf {
    dir.join(format!("{}{}.{}", camera.file_prefix(), file_stamp(at), ext))
}

pub fn clip_path(dir: &Path, camera: CameraId, at: &DateTime<Local>) -> PathBuf {
    media_path(dir, camera, at, CLIP_EXTENSION)
}
