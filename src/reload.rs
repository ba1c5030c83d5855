// src/reload.rs
//! Reload notification between the settings side and the orchestrator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crate::core::StopWait;

pub const WATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Raised by whoever changes the settings, cleared by the orchestrator when
/// it starts a new generation.
#[derive(Debug, Clone, Default)]
pub struct ReloadSignal(Arc<AtomicBool>);

impl ReloadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Polls a config file's modification time and raises the signal when it
/// changes.
pub struct ConfigWatcher {
    stop: Arc<StopWait>,
    handle: Option<JoinHandle<()>>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ConfigWatcher {
    pub fn spawn(
        path: impl Into<PathBuf>,
        signal: ReloadSignal,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let path = path.into();
        let stop = Arc::new(StopWait::new());
        let thread_stop = stop.clone();

        let handle = thread::Builder::new()
            .name("config-watch".into())
            .spawn(move || {
                let mut last = modified(&path);
                while !thread_stop.wait_timeout(interval) {
                    let now = modified(&path);
                    if now != last {
                        log::info!("[config] {} changed, reload requested", path.display());
                        last = now;
                        signal.request();
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
