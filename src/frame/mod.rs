//! Frame types flowing through one camera's pipeline.

pub mod codec;
pub mod overlay;

use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Local};
use image::RgbImage;

pub use codec::JpegCodec;
pub use overlay::{Region, draw_overlay, draw_rect};

/// A decoded RGB image as it came off the device.
///
/// Owned by the capture iteration that produced it and never shared
/// across threads.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub image: RgbImage,
    /// Monotonic capture time, used for pacing and clip age.
    pub captured_at: Instant,
    /// Wall clock capture time, used for overlay text.
    pub wall_time: DateTime<Local>,
}

impl RawFrame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            wall_time: Local::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A compressed frame as handed to viewers.
///
/// Immutable once created; clones share the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub seq: u64,
    pub captured_utc_ns: u64,
    pub bytes: Bytes,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
