use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::lock::{lock_mutex, wait_while_timeout};

/// Interruptible sleep shared between a worker thread and its owner.
///
/// Workers sleep through `wait_timeout`/`wait_until`; `stop` wakes them
/// immediately instead of letting the sleep run out.
pub struct StopWait {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopWait {
    pub fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Returns `true` if stop was requested before or during the wait.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let guard = lock_mutex(&self.stopped, "StopWait::wait_timeout");
        let (guard, _) = wait_while_timeout(
            &self.condvar,
            guard,
            duration,
            "StopWait::wait_timeout",
            |stopped| !*stopped,
        );
        *guard
    }

    pub fn wait_until(&self, deadline: Instant) -> bool {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return self.is_stopped();
        }
        self.wait_timeout(remaining)
    }

    pub fn stop(&self) {
        *lock_mutex(&self.stopped, "StopWait::stop") = true;
        self.condvar.notify_all();
    }

    pub fn reset(&self) {
        *lock_mutex(&self.stopped, "StopWait::reset") = false;
    }

    pub fn is_stopped(&self) -> bool {
        *lock_mutex(&self.stopped, "StopWait::is_stopped")
    }
}

impl Default for StopWait {
    fn default() -> Self {
        Self::new()
    }
}
