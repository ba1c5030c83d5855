// src/recorder/mod.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use crate::core::MediaError;
use crate::core::lock::{lock_rwlock_read, lock_rwlock_write};

pub const CLIP_EXTENSION: &str = "mjpeg";
pub const SNAPSHOT_DIR: &str = "snapshots";

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub enabled: bool,
    pub clip_length: Duration,
    pub storage_path: PathBuf,
    /// Days; 0 or negative keeps clips forever.
    pub retention_days: i64,
    pub retention_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            clip_length: Duration::from_secs(5 * 60),
            storage_path: PathBuf::from("recordings"),
            retention_days: 7,
            retention_interval: Duration::from_secs(3600),
            jpeg_quality: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub dir: PathBuf,
    pub jpeg_quality: u8,
}

impl SnapshotSettings {
    pub fn under(storage_path: &Path, enabled: bool, jpeg_quality: u8) -> Self {
        Self {
            enabled,
            dir: storage_path.join(SNAPSHOT_DIR),
            jpeg_quality,
        }
    }
}

/// Sink for the frames of one clip file.
pub trait ClipWriter: Send {
    fn write_frame(&mut self, jpeg: &[u8]) -> Result<(), MediaError>;
    /// Flushes and releases the underlying file.
    fn finish(&mut self) -> Result<(), MediaError>;
}

pub trait RetentionPolicy: Send {
    fn run(&mut self, now: SystemTime) -> SweepReport;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: Vec<PathBuf>,
    pub failed: usize,
}

/// Path of the clip currently being written, readable by the retention sweep.
#[derive(Debug, Clone, Default)]
pub struct OpenClipMarker(Arc<RwLock<Option<PathBuf>>>);

impl OpenClipMarker {
    pub fn set(&self, path: Option<PathBuf>) {
        *lock_rwlock_write(&self.0, "OpenClipMarker::set") = path;
    }

    pub fn get(&self) -> Option<PathBuf> {
        lock_rwlock_read(&self.0, "OpenClipMarker::get").clone()
    }

    pub fn is_open(&self, path: &Path) -> bool {
        lock_rwlock_read(&self.0, "OpenClipMarker::is_open").as_deref() == Some(path)
    }
}

pub mod clip;
pub mod footage;
pub mod recorder;
pub mod retention_fs;
pub mod sink_mjpeg;
pub mod snapshot;

pub use clip::Clip;
pub use recorder::RollingRecorder;
pub use retention_fs::FsRetention;
pub use sink_mjpeg::MjpegClipWriter;
pub use snapshot::EventSnapshotter;
