//! Per-camera acquisition loop.
//!
//! One thread per camera paces reads from the device, runs motion analysis
//! on every Nth frame, stamps the overlay, feeds snapshotter and recorder,
//! encodes once and pushes the JPEG to the broadcaster.

pub mod pacer;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::broadcast::FrameBroadcaster;
use crate::core::lock::lock_mutex;
use crate::core::{
    CameraId, CaptureError, Clock, ComponentLogger, DeviceError, LogContext, RateLimit, StopWait,
    utc_ns_now,
};
use crate::device::{CaptureDevice, DeviceOpener, DeviceSettings};
use crate::frame::{JpegCodec, draw_overlay};
use crate::motion::{MotionAnalyzer, MotionSettings};
use crate::recorder::{EventSnapshotter, RollingRecorder, SnapshotSettings};

pub use pacer::FramePacer;

const LOG_EVERY: u64 = 100;

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device: DeviceSettings,
    pub motion_enabled: bool,
    /// Run motion analysis on every Nth frame and reuse the result in between.
    pub motion_check_interval: u32,
    pub motion: MotionSettings,
    pub snapshot: SnapshotSettings,
    pub jpeg_quality: u8,
    /// Pause after a failed device read.
    pub read_backoff: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Stopped,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub camera: CameraId,
    pub state: LoopState,
    pub frames_captured: u64,
    pub read_failures: u64,
    pub encode_failures: u64,
    pub motion_active: bool,
}

#[derive(Debug, Default)]
struct Counters {
    frames_captured: AtomicU64,
    read_failures: AtomicU64,
    encode_failures: AtomicU64,
    motion_active: AtomicBool,
}

pub struct CaptureLoop {
    camera: CameraId,
    settings: CaptureSettings,
    opener: Arc<dyn DeviceOpener>,
    broadcaster: Arc<FrameBroadcaster>,
    recorder: Arc<RollingRecorder>,
    clock: Arc<dyn Clock>,
    state: Mutex<LoopState>,
    stop: Arc<StopWait>,
    counters: Arc<Counters>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureLoop {
    pub fn new(
        camera: CameraId,
        settings: CaptureSettings,
        opener: Arc<dyn DeviceOpener>,
        broadcaster: Arc<FrameBroadcaster>,
        recorder: Arc<RollingRecorder>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            camera,
            settings,
            opener,
            broadcaster,
            recorder,
            clock,
            state: Mutex::new(LoopState::Stopped),
            stop: Arc::new(StopWait::new()),
            counters: Arc::new(Counters::default()),
            handle: Mutex::new(None),
        }
    }

    pub fn camera(&self) -> CameraId {
        self.camera
    }

    pub fn broadcaster(&self) -> &Arc<FrameBroadcaster> {
        &self.broadcaster
    }

    pub fn state(&self) -> LoopState {
        *lock_mutex(&self.state, "CaptureLoop::state")
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus {
            camera: self.camera,
            state: self.state(),
            frames_captured: self.counters.frames_captured.load(Ordering::Relaxed),
            read_failures: self.counters.read_failures.load(Ordering::Relaxed),
            encode_failures: self.counters.encode_failures.load(Ordering::Relaxed),
            motion_active: self.counters.motion_active.load(Ordering::Relaxed),
        }
    }

    /// Opens the device on a new capture thread and returns once it is
    /// known whether that worked.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut state = lock_mutex(&self.state, "CaptureLoop::start");
        if *state != LoopState::Stopped {
            return Err(CaptureError::AlreadyRunning(self.camera));
        }
        if self.broadcaster.is_closed() {
            return Err(CaptureError::Finished(self.camera));
        }

        self.stop.reset();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), DeviceError>>();

        let worker = Worker {
            camera: self.camera,
            settings: self.settings.clone(),
            analyzer: MotionAnalyzer::new(self.settings.motion),
            snapshotter: EventSnapshotter::new(
                self.camera,
                self.settings.snapshot.clone(),
                self.clock.clone(),
            ),
            codec: JpegCodec::new(self.settings.jpeg_quality),
            recorder: self.recorder.clone(),
            broadcaster: self.broadcaster.clone(),
            stop: self.stop.clone(),
            counters: self.counters.clone(),
        };
        let opener = self.opener.clone();

        let handle = thread::Builder::new()
            .name(format!("capture-{}", self.camera))
            .spawn(move || worker.run(opener.as_ref(), ready_tx))
            .map_err(|source| CaptureError::Spawn {
                camera: self.camera,
                source,
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::ThreadExited(self.camera));
            }
        }

        if let Err(e) = self.recorder.start_retention() {
            self.warn(&format!("retention sweep not started: {}", e));
        }

        *lock_mutex(&self.handle, "CaptureLoop::start") = Some(handle);
        *state = LoopState::Running;
        self.info("capture started");
        Ok(())
    }

    /// Ends the loop at the next iteration boundary, then flushes the
    /// recorder and closes the broadcaster. Safe to call in any state; once
    /// stopped, `start` returns [`CaptureError::Finished`].
    pub fn stop(&self) {
        {
            let mut state = lock_mutex(&self.state, "CaptureLoop::stop");
            if *state == LoopState::Running {
                *state = LoopState::Stopping;
            }
        }

        self.stop.stop();
        let handle = lock_mutex(&self.handle, "CaptureLoop::stop").take();
        let was_running = handle.is_some();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                self.error("capture thread panicked");
            }
        }

        self.recorder.stop();
        self.broadcaster.close();
        *lock_mutex(&self.state, "CaptureLoop::stop") = LoopState::Stopped;

        if was_running {
            self.info("capture stopped");
        }
    }
}

impl ComponentLogger for CaptureLoop {
    fn log_context(&self) -> LogContext {
        LogContext::new("Capture", self.camera)
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the capture thread.
struct Worker {
    camera: CameraId,
    settings: CaptureSettings,
    analyzer: MotionAnalyzer,
    snapshotter: EventSnapshotter,
    codec: JpegCodec,
    recorder: Arc<RollingRecorder>,
    broadcaster: Arc<FrameBroadcaster>,
    stop: Arc<StopWait>,
    counters: Arc<Counters>,
}

impl ComponentLogger for Worker {
    fn log_context(&self) -> LogContext {
        LogContext::new("Capture", self.camera)
    }
}

impl Worker {
    fn run(mut self, opener: &dyn DeviceOpener, ready: mpsc::Sender<Result<(), DeviceError>>) {
        let mut device = match opener.open(self.camera, &self.settings.device) {
            Ok(d) => d,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        drop(ready);

        self.capture(device.as_mut());
        device.release();
        self.counters.motion_active.store(false, Ordering::Relaxed);
    }

    fn capture(&mut self, device: &mut dyn CaptureDevice) {
        let mut pacer = FramePacer::from_fps(self.settings.device.fps);
        let check_every = u64::from(self.settings.motion_check_interval.max(1));
        let mut read_failures = RateLimit::new(LOG_EVERY);
        let mut encode_failures = RateLimit::new(LOG_EVERY);
        let mut frame_index: u64 = 0;
        let mut motion = false;

        loop {
            if pacer.wait(&self.stop) {
                break;
            }

            let mut frame = match device.read() {
                Ok(frame) => {
                    read_failures.reset();
                    frame
                }
                Err(e) => {
                    self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                    if let Some(n) = read_failures.hit() {
                        self.warn(&format!("read failed ({}x): {}", n, e));
                    }
                    if self.stop.wait_timeout(self.settings.read_backoff) {
                        break;
                    }
                    continue;
                }
            };
            self.counters.frames_captured.fetch_add(1, Ordering::Relaxed);

            if self.settings.motion_enabled && frame_index % check_every == 0 {
                let detection = self.analyzer.detect(frame);
                motion = detection.active;
                frame = detection.frame;
                self.counters.motion_active.store(motion, Ordering::Relaxed);
            }
            frame_index = frame_index.wrapping_add(1);

            draw_overlay(&mut frame, self.camera, motion);
            self.snapshotter.on_frame(&frame, motion);

            let jpeg = match self.codec.encode(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                    if let Some(n) = encode_failures.hit() {
                        self.warn(&format!("frame dropped ({}x): {}", n, e));
                    }
                    continue;
                }
            };

            self.recorder.write_encoded(&jpeg);
            self.broadcaster.push(jpeg, utc_ns_now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{BroadcastSettings, SubscribeRead};
    use crate::recorder::RecorderSettings;
    use crate::frame::JpegCodec;
    use crate::testing::mocks::{ManualClock, MockDeviceOpener, MockRead, block_frame, solid_frame};
    use image::RgbImage;
    use std::fs;
    use std::path::Path;
    use std::time::{Instant, SystemTime};

    fn settings(dir: &Path) -> CaptureSettings {
        CaptureSettings {
            device: DeviceSettings {
                width: 32,
                height: 24,
                fps: 100,
                ..DeviceSettings::default()
            },
            motion_enabled: false,
            motion_check_interval: 3,
            motion: MotionSettings::default(),
            snapshot: SnapshotSettings::under(dir, false, 90),
            jpeg_quality: 60,
            read_backoff: Duration::from_millis(1),
        }
    }

    fn capture_loop(dir: &Path, opener: MockDeviceOpener) -> CaptureLoop {
        let recorder = RecorderSettings {
            storage_path: dir.to_path_buf(),
            ..RecorderSettings::default()
        };
        capture_loop_with(opener, settings(dir), recorder)
    }

    fn capture_loop_with(
        opener: MockDeviceOpener,
        settings: CaptureSettings,
        recorder: RecorderSettings,
    ) -> CaptureLoop {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let recorder = Arc::new(RollingRecorder::new(CameraId(0), recorder, clock.clone()));
        CaptureLoop::new(
            CameraId(0),
            settings,
            Arc::new(opener),
            FrameBroadcaster::new(CameraId(0), BroadcastSettings::default()),
            recorder,
            clock,
        )
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn has_red_box(image: &RgbImage) -> bool {
        image
            .pixels()
            .any(|p| p.0[0] > 120 && p.0[1] < 80 && p.0[2] < 80)
    }

    fn has_overlay_text(image: &RgbImage) -> bool {
        (10..26).any(|y| (10..60).any(|x| image.get_pixel(x, y).0.iter().all(|&c| c > 180)))
    }

    /// Splits a Motion-JPEG clip at its start-of-image markers.
    fn clip_frames(bytes: &[u8]) -> Vec<RgbImage> {
        let starts: Vec<usize> = bytes
            .windows(2)
            .enumerate()
            .filter(|(_, w)| *w == [0xFF, 0xD8])
            .map(|(i, _)| i)
            .collect();
        starts
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let end = starts.get(n + 1).copied().unwrap_or(bytes.len());
                JpegCodec::decode(&bytes[s..end]).unwrap()
            })
            .collect()
    }

    #[test]
    fn start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cl = capture_loop(dir.path(), MockDeviceOpener::new());
        cl.start().unwrap();
        assert_eq!(cl.state(), LoopState::Running);
        assert!(matches!(cl.start(), Err(CaptureError::AlreadyRunning(_))));
        cl.stop();
        assert_eq!(cl.state(), LoopState::Stopped);
    }

    #[test]
    fn open_failure_is_reported_and_state_stays_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let cl = capture_loop(dir.path(), MockDeviceOpener::new().failing_opens(1));
        assert!(matches!(
            cl.start(),
            Err(CaptureError::Device(DeviceError::Open { .. }))
        ));
        assert_eq!(cl.state(), LoopState::Stopped);
        // second attempt succeeds
        cl.start().unwrap();
        cl.stop();
    }

    #[test]
    fn read_failures_do_not_end_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let opener = MockDeviceOpener::new().script([MockRead::Fail, MockRead::Fail]);
        let cl = capture_loop(dir.path(), opener);
        let mut sub = cl.broadcaster().subscribe(Duration::from_secs(2));
        cl.start().unwrap();

        assert!(matches!(sub.recv(), SubscribeRead::Frame(_)));
        let status = cl.status();
        assert_eq!(status.read_failures, 2);
        assert!(status.frames_captured >= 1);

        cl.stop();
        assert_eq!(sub.recv(), SubscribeRead::Closed);
    }

    #[test]
    fn stopped_loop_cannot_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cl = capture_loop(dir.path(), MockDeviceOpener::new());
        cl.start().unwrap();
        cl.stop();
        assert!(cl.broadcaster().is_closed());
        assert!(matches!(cl.start(), Err(CaptureError::Finished(CameraId(0)))));
        assert_eq!(cl.state(), LoopState::Stopped);
    }

    #[test]
    fn motion_runs_every_nth_frame_and_annotated_frames_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (w, h) = (128, 96);
        // frame 0 seeds the reference; the block appears at frame 1 and stays
        let opener = MockDeviceOpener::new().script([
            MockRead::Frame(solid_frame(w, h, 0).image),
            MockRead::Frame(block_frame(w, h, 0, 255, 54, 50, 20).image),
        ]);
        let settings = CaptureSettings {
            device: DeviceSettings {
                width: w,
                height: h,
                fps: 100,
                ..DeviceSettings::default()
            },
            motion_enabled: true,
            motion_check_interval: 3,
            motion: MotionSettings {
                contour_area: 100,
                ..MotionSettings::default()
            },
            snapshot: SnapshotSettings::under(dir.path(), true, 95),
            jpeg_quality: 95,
            read_backoff: Duration::from_millis(1),
        };
        let recorder = RecorderSettings {
            enabled: true,
            storage_path: dir.path().to_path_buf(),
            retention_days: 0,
            ..RecorderSettings::default()
        };
        let cl = capture_loop_with(opener, settings, recorder);
        cl.start().unwrap();
        assert!(wait_for(Duration::from_secs(5), || cl.status().frames_captured >= 8));
        cl.stop();

        let status = cl.status();
        // frame 6 compared the block against itself
        assert!(!status.motion_active);

        let clips: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "mjpeg"))
            .collect();
        assert_eq!(clips.len(), 1);
        let frames = clip_frames(&fs::read(&clips[0]).unwrap());
        assert_eq!(frames.len() as u64, status.frames_captured);

        // only analysed frames (0, 3, 6, ...) can carry the box; frames 1
        // and 2 already show the block but were not analysed
        let boxed: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, f)| has_red_box(f))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(boxed, vec![3]);
        assert!(frames.iter().all(has_overlay_text));

        let snapshots: Vec<_> = fs::read_dir(dir.path().join("snapshots"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(snapshots.len(), 1);
        let still = JpegCodec::decode(&fs::read(&snapshots[0]).unwrap()).unwrap();
        assert!(has_red_box(&still));
        assert!(has_overlay_text(&still));
    }

    #[test]
    fn retention_sweep_runs_while_capturing() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("cam0_20200101_000000.mjpeg");
        fs::write(&old, b"x").unwrap();
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(10 * 24 * 3600))
            .unwrap();

        let recorder = RecorderSettings {
            enabled: false,
            storage_path: dir.path().to_path_buf(),
            retention_days: 1,
            retention_interval: Duration::from_millis(20),
            ..RecorderSettings::default()
        };
        let cl = capture_loop_with(MockDeviceOpener::new(), settings(dir.path()), recorder);
        cl.start().unwrap();

        assert!(wait_for(Duration::from_secs(2), || !old.exists()));

        // a clip that turns old later is caught by a following pass
        let later = dir.path().join("cam0_20200102_000000.mjpeg");
        fs::write(&later, b"x").unwrap();
        fs::File::options()
            .write(true)
            .open(&later)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3 * 24 * 3600))
            .unwrap();
        assert!(wait_for(Duration::from_secs(2), || !later.exists()));
        cl.stop();
    }
}
