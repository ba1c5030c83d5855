//! Camera device abstraction: open, read a frame, release.

pub mod pattern;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use serde::{Deserialize, Serialize};

use crate::core::{CameraId, DeviceError};
use crate::frame::RawFrame;

pub use pattern::PatternDevice;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Device;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic test picture, needs no hardware.
    #[default]
    Pattern,
    V4l2,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceSettings {
    pub source: SourceKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::Pattern,
            width: 640,
            height: 480,
            fps: 15,
        }
    }
}

/// An opened camera. Lives on the capture thread that opened it.
pub trait CaptureDevice {
    /// Blocks until the next frame. `DeviceError::Transient` means "try
    /// again"; anything else is reported but also retried by the loop.
    fn read(&mut self) -> Result<RawFrame, DeviceError>;

    /// Releases the hardware. Called once when the loop ends.
    fn release(&mut self);
}

pub trait DeviceOpener: Send + Sync {
    fn open(
        &self,
        camera: CameraId,
        settings: &DeviceSettings,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError>;
}

/// Opens the device kind named in the settings.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    fn open(
        &self,
        camera: CameraId,
        settings: &DeviceSettings,
    ) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        match settings.source {
            SourceKind::Pattern => Ok(Box::new(PatternDevice::new(camera, settings))),
            #[cfg(feature = "v4l2")]
            SourceKind::V4l2 => Ok(Box::new(V4l2Device::open(camera, settings)?)),
            #[cfg(not(feature = "v4l2"))]
            SourceKind::V4l2 => Err(DeviceError::open(
                camera,
                "built without the `v4l2` feature",
            )),
        }
    }
}
