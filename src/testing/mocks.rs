use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta, TimeZone};
use image::{Rgb, RgbImage};

use crate::core::lock::lock_mutex;
use crate::core::{CameraId, Clock, DeviceError};
use crate::device::{CaptureDevice, DeviceOpener, DeviceSettings};
use crate::frame::RawFrame;

pub fn solid_frame(width: u32, height: u32, level: u8) -> RawFrame {
    RawFrame::new(RgbImage::from_pixel(width, height, Rgb([level; 3])))
}

/// Background `bg` with a square of `fg` at (`x`, `y`).
pub fn block_frame(width: u32, height: u32, bg: u8, fg: u8, x: u32, y: u32, size: u32) -> RawFrame {
    let mut frame = solid_frame(width, height, bg);
    for py in y..(y + size).min(height) {
        for px in x..(x + size).min(width) {
            frame.image.put_pixel(px, py, Rgb([fg; 3]));
        }
    }
    frame
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Local>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Local>) {
        *lock_mutex(&self.now, "ManualClock::set") = at;
    }

    pub fn advance(&self, by: Duration) {
        let by = TimeDelta::from_std(by).unwrap_or(TimeDelta::zero());
        *lock_mutex(&self.now, "ManualClock::advance") += by;
    }

    pub fn rewind(&self, by: Duration) {
        let by = TimeDelta::from_std(by).unwrap_or(TimeDelta::zero());
        *lock_mutex(&self.now, "ManualClock::rewind") -= by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Local
            .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *lock_mutex(&self.now, "ManualClock::now")
    }
}

/// One scripted result of `CaptureDevice::read`.
#[derive(Debug, Clone)]
pub enum MockRead {
    Frame(RgbImage),
    Fail,
}

#[derive(Debug, Default)]
pub struct MockStats {
    pub opens: AtomicU64,
    pub reads: AtomicU64,
    pub releases: AtomicU64,
}

impl MockStats {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }
}

/// Opener handing out [`MockDevice`]s that replay a shared script, then
/// keep repeating the last scripted frame (flat gray if there was none).
pub struct MockDeviceOpener {
    failing_opens: AtomicU32,
    script: Arc<Mutex<VecDeque<MockRead>>>,
    stats: Arc<MockStats>,
}

impl MockDeviceOpener {
    pub fn new() -> Self {
        Self {
            failing_opens: AtomicU32::new(0),
            script: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// The first `n` calls to `open` fail.
    pub fn failing_opens(self, n: u32) -> Self {
        self.failing_opens.store(n, Ordering::Relaxed);
        self
    }

    pub fn script(self, reads: impl IntoIterator<Item = MockRead>) -> Self {
        lock_mutex(&self.script, "MockDeviceOpener::script").extend(reads);
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

impl Default for MockDeviceOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceOpener for MockDeviceOpener {
    fn open(
        &self,
        camera: CameraId,
        settings: &DeviceSettings,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        self.stats.opens.fetch_add(1, Ordering::Relaxed);

        let failed = self
            .failing_opens
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DeviceError::open(camera, "mock open failure"));
        }

        Ok(Box::new(MockDevice {
            camera,
            width: settings.width,
            height: settings.height,
            script: self.script.clone(),
            stats: self.stats.clone(),
            last: None,
        }))
    }
}

pub struct MockDevice {
    camera: CameraId,
    width: u32,
    height: u32,
    script: Arc<Mutex<VecDeque<MockRead>>>,
    stats: Arc<MockStats>,
    last: Option<RgbImage>,
}

impl CaptureDevice for MockDevice {
    fn read(&mut self) -> Result<RawFrame, DeviceError> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        let next = lock_mutex(&self.script, "MockDevice::read").pop_front();
        match next {
            Some(MockRead::Frame(image)) => {
                self.last = Some(image.clone());
                Ok(RawFrame::new(image))
            }
            Some(MockRead::Fail) => Err(DeviceError::transient(self.camera, "scripted failure")),
            None => match &self.last {
                Some(image) => Ok(RawFrame::new(image.clone())),
                None => Ok(solid_frame(self.width, self.height, 64)),
            },
        }
    }

    fn release(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::Relaxed);
    }
}
