// src/recorder/recorder.rs

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use chrono::{DateTime, Local, TimeDelta};

use crate::core::lock::lock_mutex;
use crate::core::{
    CameraId, CaptureError, Clock, ComponentLogger, LogContext, MediaError, RateLimit, StopWait,
};
use crate::frame::{JpegCodec, RawFrame};

use super::clip::{Clip, clip_path};
use super::{FsRetention, MjpegClipWriter, OpenClipMarker, RecorderSettings, RetentionPolicy};

const LOG_EVERY: u64 = 100;

struct State {
    clip: Option<Clip>,
    open_failures: RateLimit,
    write_failures: RateLimit,
}

/// Writes one camera's frames into time-bounded clip files and runs the
/// retention sweep for them in the background.
pub struct RollingRecorder {
    camera: CameraId,
    settings: RecorderSettings,
    clip_length: TimeDelta,
    clock: Arc<dyn Clock>,
    codec: JpegCodec,
    state: Mutex<State>,
    open_clip: OpenClipMarker,
    sweep_stop: Arc<StopWait>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl RollingRecorder {
    pub fn new(camera: CameraId, settings: RecorderSettings, clock: Arc<dyn Clock>) -> Self {
        let clip_length = TimeDelta::from_std(settings.clip_length).unwrap_or(TimeDelta::MAX);
        let codec = JpegCodec::new(settings.jpeg_quality);
        Self {
            camera,
            settings,
            clip_length,
            clock,
            codec,
            state: Mutex::new(State {
                clip: None,
                open_failures: RateLimit::new(LOG_EVERY),
                write_failures: RateLimit::new(LOG_EVERY),
            }),
            open_clip: OpenClipMarker::default(),
            sweep_stop: Arc::new(StopWait::new()),
            sweeper: Mutex::new(None),
        }
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    /// Path of the clip being written, if any.
    pub fn open_clip_path(&self) -> Option<PathBuf> {
        self.open_clip.get()
    }

    /// Retention policy for this camera, aware of the clip currently open.
    pub fn retention(&self) -> FsRetention {
        FsRetention::new(
            self.camera,
            self.settings.storage_path.clone(),
            self.settings.retention_days,
            self.open_clip.clone(),
        )
    }

    /// Starts the periodic retention sweep. Does nothing when retention is
    /// disabled or the sweep already runs.
    pub fn start_retention(&self) -> Result<(), CaptureError> {
        let mut policy = self.retention();
        if !policy.is_enabled() {
            return Ok(());
        }

        let mut sweeper = lock_mutex(&self.sweeper, "RollingRecorder::start_retention");
        if sweeper.is_some() {
            return Ok(());
        }

        self.sweep_stop.reset();
        let stop = self.sweep_stop.clone();
        let interval = self.settings.retention_interval;

        let handle = thread::Builder::new()
            .name(format!("retention-{}", self.camera))
            .spawn(move || {
                loop {
                    policy.run(SystemTime::now());
                    if stop.wait_timeout(interval) {
                        break;
                    }
                }
            })
            .map_err(|source| CaptureError::Spawn {
                camera: self.camera,
                source,
            })?;

        *sweeper = Some(handle);
        Ok(())
    }

    /// Encodes and appends `frame` to the current clip, rotating first if
    /// the clip is due.
    pub fn write(&self, frame: &RawFrame) {
        if !self.settings.enabled {
            return;
        }
        match self.codec.encode(frame) {
            Ok(jpeg) => self.write_encoded(&jpeg),
            Err(e) => self.warn(&format!("frame not recorded: {}", e)),
        }
    }

    /// Appends an already encoded frame.
    pub fn write_encoded(&self, jpeg: &[u8]) {
        if !self.settings.enabled {
            return;
        }

        let now = self.clock.now();
        let mut state = lock_mutex(&self.state, "RollingRecorder::write");

        let due = match &state.clip {
            None => true,
            Some(clip) => {
                let age = now.signed_duration_since(clip.started_at);
                // rückwärts laufende Uhr: ebenfalls neue Datei
                age < TimeDelta::zero() || age >= self.clip_length
            }
        };

        if due {
            self.close_current_clip(&mut state);
            self.open_new_clip(&mut state, now);
        }

        let State {
            clip,
            write_failures,
            ..
        } = &mut *state;
        if let Some(clip) = clip.as_mut() {
            match clip.append(jpeg) {
                Ok(()) => write_failures.reset(),
                Err(e) => {
                    if let Some(n) = write_failures.hit() {
                        self.warn(&format!("write to {} failed ({}x): {}", clip.file_name(), n, e));
                    }
                }
            }
        }
    }

    /// Closes the open clip and stops the retention sweep. Safe to call more
    /// than once; a later `write` opens a fresh clip.
    pub fn stop(&self) {
        self.sweep_stop.stop();
        let handle = lock_mutex(&self.sweeper, "RollingRecorder::stop").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                self.error("retention thread panicked");
            }
        }

        let mut state = lock_mutex(&self.state, "RollingRecorder::stop");
        self.close_current_clip(&mut state);
    }

    fn open_new_clip(&self, state: &mut State, now: DateTime<Local>) {
        let dir = &self.settings.storage_path;
        let path = clip_path(dir, self.camera, &now);

        let opened = fs::create_dir_all(dir)
            .map_err(|e| MediaError::io(dir, e))
            .and_then(|()| MjpegClipWriter::open(&path));

        match opened {
            Ok(writer) => {
                let clip = Clip::new(path.clone(), now, Box::new(writer));
                self.info(&format!("new clip: {}", clip.file_name()));
                state.clip = Some(clip);
                state.open_failures.reset();
                self.open_clip.set(Some(path));
            }
            Err(e) => {
                if let Some(n) = state.open_failures.hit() {
                    self.error(&format!("failed to open {} ({}x): {}", path.display(), n, e));
                }
            }
        }
    }

    fn close_current_clip(&self, state: &mut State) {
        let Some(mut clip) = state.clip.take() else {
            return;
        };
        self.open_clip.set(None);

        if let Err(e) = clip.writer.finish() {
            self.warn(&format!("closing {} failed: {}", clip.file_name(), e));
        }
        self.info(&format!(
            "closed {} ({} frames)",
            clip.file_name(),
            clip.frame_count
        ));
    }
}

impl ComponentLogger for RollingRecorder {
    fn log_context(&self) -> LogContext {
        LogContext::new("Recorder", self.camera)
    }
}

impl Drop for RollingRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
