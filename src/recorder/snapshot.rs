// src/recorder/snapshot.rs
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{CameraId, Clock, ComponentLogger, LogContext, MediaError};
use crate::frame::{JpegCodec, RawFrame};

use super::SnapshotSettings;
use super::clip::media_path;

/// Writes one still per motion episode, on the rising edge of the motion flag.
pub struct EventSnapshotter {
    camera: CameraId,
    settings: SnapshotSettings,
    clock: Arc<dyn Clock>,
    codec: JpegCodec,
    was_motion: bool,
}

impl EventSnapshotter {
    pub fn new(camera: CameraId, settings: SnapshotSettings, clock: Arc<dyn Clock>) -> Self {
        let codec = JpegCodec::new(settings.jpeg_quality);
        Self {
            camera,
            settings,
            clock,
            codec,
            was_motion: false,
        }
    }

    /// Returns the path written, if this frame started a motion episode.
    pub fn on_frame(&mut self, frame: &RawFrame, motion: bool) -> Option<PathBuf> {
        if !self.settings.enabled {
            return None;
        }

        let rising = motion && !self.was_motion;
        self.was_motion = motion;
        if !rising {
            return None;
        }

        match self.save(frame) {
            Ok(path) => {
                self.info(&format!("motion detected, saved {}", path.display()));
                Some(path)
            }
            Err(e) => {
                self.warn(&format!("snapshot failed: {}", e));
                None
            }
        }
    }

    fn save(&self, frame: &RawFrame) -> Result<PathBuf, MediaError> {
        let dir = &self.settings.dir;
        fs::create_dir_all(dir).map_err(|e| MediaError::io(dir, e))?;

        let path = media_path(dir, self.camera, &self.clock.now(), "jpg");
        let jpeg = self.codec.encode(frame)?;
        fs::write(&path, jpeg).map_err(|e| MediaError::io(&path, e))?;
        Ok(path)
    }
}

impl ComponentLogger for EventSnapshotter {
    fn log_context(&self) -> LogContext {
        LogContext::new("Snapshot", self.camera)
    }
}
