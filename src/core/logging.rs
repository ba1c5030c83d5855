// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use super::CameraId;

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: &'static str,
    pub camera: CameraId,
    pub sequence: u64,
}

impl LogContext {
    pub fn new(component: &'static str, camera: CameraId) -> Self {
        Self {
            component,
            camera,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn format(&self, message: &str) -> String {
        format!(
            "[seq={:06}][{}:{}] {}",
            self.sequence, self.component, self.camera, message
        )
    }
}

/// Einheitliches Logging für alle Komponenten einer Kamera.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }
}

/// Logs the first occurrence and then every `every`-th one.
#[derive(Debug)]
pub struct RateLimit {
    every: u64,
    count: u64,
}

impl RateLimit {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
        }
    }

    pub fn hit(&mut self) -> Option<u64> {
        self.count += 1;
        if self.count == 1 || self.count % self.every == 0 {
            Some(self.count)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}
