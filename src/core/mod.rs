pub mod error;
pub mod lock;
pub mod logging;
pub mod timestamp;
pub mod wait;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use error::{CaptureError, ConfigError, DeviceError, MediaError};
pub use logging::{ComponentLogger, LogContext, RateLimit};
pub use timestamp::{Clock, SystemClock, utc_ns_now};
pub use wait::StopWait;

/// Camera index as used by the device layer (`/dev/videoN`, `camN_*` files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl CameraId {
    /// Prefix shared by every file this camera writes.
    pub fn file_prefix(&self) -> String {
        format!("cam{}_", self.0)
    }

    /// Parses `camN` (as used in URLs and file names).
    pub fn parse_name(name: &str) -> Option<Self> {
        let digits = name.strip_prefix("cam")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(CameraId)
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}
