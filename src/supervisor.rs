// src/supervisor.rs
//! Owns one capture loop and broadcaster per configured camera.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::broadcast::{BroadcastSettings, FrameBroadcaster};
use crate::capture::{CaptureLoop, CaptureSettings, CaptureStatus};
use crate::core::{CameraId, CaptureError, Clock, StopWait};
use crate::device::DeviceOpener;
use crate::recorder::{RecorderSettings, RollingRecorder};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub cameras: Vec<CameraId>,
    pub capture: CaptureSettings,
    pub recorder: RecorderSettings,
    pub broadcast: BroadcastSettings,
    pub open_attempts: u32,
    pub retry_delay: Duration,
}

pub struct CaptureSupervisor {
    loops: BTreeMap<CameraId, CaptureLoop>,
    open_attempts: u32,
    retry_delay: Duration,
    shutdown: StopWait,
    stopped: AtomicBool,
}

impl CaptureSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        opener: Arc<dyn DeviceOpener>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let loops = settings
            .cameras
            .iter()
            .map(|&camera| {
                let broadcaster = FrameBroadcaster::new(camera, settings.broadcast);
                let recorder = Arc::new(RollingRecorder::new(
                    camera,
                    settings.recorder.clone(),
                    clock.clone(),
                ));
                let capture = CaptureLoop::new(
                    camera,
                    settings.capture.clone(),
                    opener.clone(),
                    broadcaster,
                    recorder,
                    clock.clone(),
                );
                (camera, capture)
            })
            .collect();

        Self {
            loops,
            open_attempts: settings.open_attempts.max(1),
            retry_delay: settings.retry_delay,
            shutdown: StopWait::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Starts every camera, retrying device opens. Cameras that still fail
    /// are returned and their broadcasters closed; the others keep running.
    pub fn start(&self) -> Vec<(CameraId, CaptureError)> {
        self.shutdown.reset();
        self.stopped.store(false, Ordering::SeqCst);
        let mut failures = Vec::new();

        for (&camera, capture) in &self.loops {
            if let Err(e) = self.start_one(capture) {
                log::error!("[Supervisor:{}] giving up: {}", camera, e);
                capture.broadcaster().close();
                failures.push((camera, e));
            }
        }
        failures
    }

    fn start_one(&self, capture: &CaptureLoop) -> Result<(), CaptureError> {
        let camera = capture.camera();
        let mut attempt = 1;
        loop {
            match capture.start() {
                Ok(()) => return Ok(()),
                Err(e @ (CaptureError::AlreadyRunning(_) | CaptureError::Finished(_))) => {
                    return Err(e);
                }
                Err(e) if attempt >= self.open_attempts => return Err(e),
                Err(e) => {
                    log::warn!(
                        "[Supervisor:{}] attempt {}/{} failed: {}",
                        camera,
                        attempt,
                        self.open_attempts,
                        e
                    );
                    if self.shutdown.wait_timeout(self.retry_delay) {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    pub fn broadcaster_for(&self, camera: CameraId) -> Option<Arc<FrameBroadcaster>> {
        self.loops.get(&camera).map(|c| c.broadcaster().clone())
    }

    /// Snapshot of the lookup table, for handing to the web layer.
    pub fn broadcasters(&self) -> BTreeMap<CameraId, Arc<FrameBroadcaster>> {
        self.loops
            .iter()
            .map(|(&camera, c)| (camera, c.broadcaster().clone()))
            .collect()
    }

    pub fn cameras(&self) -> Vec<CameraId> {
        self.loops.keys().copied().collect()
    }

    pub fn status(&self) -> Vec<CaptureStatus> {
        self.loops.values().map(CaptureLoop::status).collect()
    }

    /// Stops every loop, which flushes its recorder and closes its
    /// broadcaster. Later calls are no-ops.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.stop();
        for capture in self.loops.values() {
            capture.stop();
        }
        log::info!("[Supervisor] all cameras stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
