use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::CameraId;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera {camera}: open failed: {reason}")]
    Open { camera: CameraId, reason: String },
    /// Read returned nothing usable; the caller backs off and retries.
    #[error("camera {camera}: transient read failure: {reason}")]
    Transient { camera: CameraId, reason: String },
    #[error("camera {camera}: unsupported pixel format {format}")]
    UnsupportedFormat { camera: CameraId, format: String },
}

impl DeviceError {
    pub fn open(camera: CameraId, reason: impl Into<String>) -> Self {
        Self::Open {
            camera,
            reason: reason.into(),
        }
    }

    pub fn transient(camera: CameraId, reason: impl Into<String>) -> Self {
        Self::Transient {
            camera,
            reason: reason.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("capture loop for camera {0} is already running")]
    AlreadyRunning(CameraId),
    /// A stopped loop has closed its broadcaster and cannot run again.
    #[error("capture loop for camera {0} was stopped and cannot be restarted")]
    Finished(CameraId),
    #[error("failed to spawn capture thread for camera {camera}: {source}")]
    Spawn {
        camera: CameraId,
        #[source]
        source: std::io::Error,
    },
    #[error("capture thread for camera {0} exited before reporting readiness")]
    ThreadExited(CameraId),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("jpeg encode failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MediaError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_display_names_camera() {
        let err = DeviceError::open(CameraId(2), "no such device");
        assert_eq!(err.to_string(), "camera cam2: open failed: no such device");
        assert!(!err.is_transient());
        assert!(DeviceError::transient(CameraId(0), "empty").is_transient());
    }

    #[test]
    fn capture_error_wraps_device_error() {
        let err: CaptureError = DeviceError::open(CameraId(1), "busy").into();
        assert!(matches!(err, CaptureError::Device(DeviceError::Open { .. })));
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn config_error_invalid_names_key() {
        let err = ConfigError::invalid("camera.fps", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid value for 'camera.fps': must be greater than zero"
        );
    }
}
