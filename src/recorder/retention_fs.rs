// src/recorder/retention_fs.rs
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::core::{CameraId, ComponentLogger, LogContext};

use super::{CLIP_EXTENSION, OpenClipMarker, RetentionPolicy, SweepReport};

const SECS_PER_DAY: u64 = 24 * 3600;

/// Deletes a camera's clip files whose modification time is older than the
/// configured number of days.
pub struct FsRetention {
    camera: CameraId,
    base_dir: PathBuf,
    max_age: Option<Duration>,
    open_clip: OpenClipMarker,
}

impl FsRetention {
    pub fn new(
        camera: CameraId,
        base_dir: PathBuf,
        retention_days: i64,
        open_clip: OpenClipMarker,
    ) -> Self {
        // sehr große Werte: praktisch nie löschen
        let max_age = u64::try_from(retention_days)
            .ok()
            .filter(|&days| days > 0)
            .map(|days| Duration::from_secs(days.saturating_mul(SECS_PER_DAY)));
        Self {
            camera,
            base_dir,
            max_age,
            open_clip,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some()
    }

    fn owns(&self, name: &str) -> bool {
        name.starts_with(&self.camera.file_prefix())
            && name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext == CLIP_EXTENSION)
    }
}

impl ComponentLogger for FsRetention {
    fn log_context(&self) -> LogContext {
        LogContext::new("Retention", self.camera)
    }
}

impl RetentionPolicy for FsRetention {
    fn run(&mut self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();
        let Some(max_age) = self.max_age else {
            return report;
        };
        let Some(cutoff) = now.checked_sub(max_age) else {
            return report;
        };

        let entries = match fs::read_dir(&self.base_dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return report,
            Err(e) => {
                self.warn(&format!("cannot list {}: {}", self.base_dir.display(), e));
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.owns(name) || self.open_clip.is_open(&path) {
                continue;
            }

            // Datei kann zwischen Auflisten und Zugriff verschwinden
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    self.warn(&format!("cannot stat {}: {}", path.display(), e));
                    report.failed += 1;
                    continue;
                }
            };

            if modified >= cutoff {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    self.debug(&format!("removed {}", path.display()));
                    report.deleted.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    self.warn(&format!("could not delete {}: {}", path.display(), e));
                    report.failed += 1;
                }
            }
        }

        if !report.deleted.is_empty() {
            self.info(&format!("deleted {} old clip(s)", report.deleted.len()));
        }
        report
    }
}
