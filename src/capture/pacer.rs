use std::time::{Duration, Instant};

use crate::core::StopWait;

/// Paces a loop to a fixed rate using absolute deadlines, so time spent in
/// the loop body does not accumulate as drift.
#[derive(Debug)]
pub struct FramePacer {
    interval: Duration,
    next: Option<Instant>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn from_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleeps until the next deadline. The first call returns immediately.
    /// Returns `true` if `stop` fired while waiting.
    pub fn wait(&mut self, stop: &StopWait) -> bool {
        let now = Instant::now();
        let mut deadline = self.next.unwrap_or(now);
        // mehr als ein Intervall im Rückstand: neu aufsetzen statt nachholen
        if now > deadline + self.interval {
            deadline = now;
        }
        self.next = Some(deadline + self.interval);
        stop.wait_until(deadline)
    }
}
