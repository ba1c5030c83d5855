use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broadcast::BroadcastSettings;
use crate::capture::CaptureSettings;
use crate::core::{CameraId, ConfigError};
use crate::device::{DeviceSettings, SourceKind};
use crate::http::ServerSettings;
use crate::motion::MotionSettings;
use crate::recorder::{RecorderSettings, SnapshotSettings};
use crate::supervisor::SupervisorSettings;

const READ_BACKOFF: Duration = Duration::from_millis(20);

// ---------- Camera ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub devices: Vec<CameraId>,
    pub source: SourceKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub motion_detection: bool,
    pub motion_contour_area: u32,
    pub motion_check_interval: u32,
    pub jpeg_quality: u8,
    pub device_open_attempts: u32,
    pub device_retry_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            devices: vec![CameraId(0)],
            source: SourceKind::Pattern,
            width: 640,
            height: 480,
            fps: 15,
            motion_detection: true,
            motion_contour_area: 500,
            motion_check_interval: 3,
            jpeg_quality: 60,
            device_open_attempts: 3,
            device_retry_ms: 1000,
        }
    }
}

// ---------- Motion ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MotionConfig {
    pub pixel_threshold: u8,
    pub blur_sigma: f32,
    pub dilate_iterations: u32,
    pub reference_blend: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: 25,
            blur_sigma: 3.5,
            dilate_iterations: 2,
            reference_blend: 1.0,
        }
    }
}

// ---------- Record ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RecordConfig {
    pub enabled: bool,
    /// Minutes per clip.
    pub recording_length: u64,
    pub storage_path: String,
    /// Days; 0 or negative keeps everything.
    pub video_retention: i64,
    pub retention_interval_secs: u64,
    pub snapshot_quality: u8,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recording_length: 5,
            storage_path: "recordings".to_string(),
            video_retention: 7,
            retention_interval_secs: 3600,
            snapshot_quality: 90,
        }
    }
}

// ---------- Server ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub subscribe_timeout_ms: u64,
    pub max_idle_timeouts: u32,
    pub backlog: usize,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            subscribe_timeout_ms: 5000,
            max_idle_timeouts: 6,
            backlog: 0,
            username: None,
            password: None,
        }
    }
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ---------- Loader ----------
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let txt = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::with_context(format!("reading {}", path.display()), e))?;
    parse(&txt).map_err(|e| match e {
        ConfigError::Context { source, .. } => ConfigError::Context {
            context: format!("parsing {}", path.display()),
            source,
        },
        other => other,
    })
}

pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(txt).map_err(|e| ConfigError::with_context("parsing config", e))?;
    config.validate()?;
    Ok(config)
}

fn check_quality(key: &str, q: u8) -> Result<(), ConfigError> {
    if (1..=100).contains(&q) {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("{} is outside 1..=100", q)))
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if cam.devices.is_empty() {
            return Err(ConfigError::invalid("camera.devices", "no cameras configured"));
        }
        let mut seen = BTreeSet::new();
        for id in &cam.devices {
            if !seen.insert(id) {
                return Err(ConfigError::invalid(
                    "camera.devices",
                    format!("{} listed twice", id),
                ));
            }
        }
        for (key, value) in [
            ("camera.width", cam.width),
            ("camera.height", cam.height),
            ("camera.fps", cam.fps),
            ("camera.motion_check_interval", cam.motion_check_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be greater than 0"));
            }
        }
        check_quality("camera.jpeg_quality", cam.jpeg_quality)?;
        check_quality("record.snapshot_quality", self.record.snapshot_quality)?;

        let blend = self.motion.reference_blend;
        if !(blend > 0.0 && blend <= 1.0) {
            return Err(ConfigError::invalid(
                "motion.reference_blend",
                format!("{} is outside (0, 1]", blend),
            ));
        }
        if self.motion.blur_sigma < 0.0 {
            return Err(ConfigError::invalid("motion.blur_sigma", "must not be negative"));
        }

        if self.record.enabled && self.record.recording_length == 0 {
            return Err(ConfigError::invalid(
                "record.recording_length",
                "must be greater than 0 when recording is enabled",
            ));
        }
        if self.server.subscribe_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "server.subscribe_timeout_ms",
                "must be greater than 0",
            ));
        }
        match (&self.server.username, &self.server.password) {
            (Some(_), None) => Err(ConfigError::invalid("server.password", "username without password")),
            (None, Some(_)) => Err(ConfigError::invalid("server.username", "password without username")),
            _ => Ok(()),
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        PathBuf::from(&self.record.storage_path)
    }

    pub fn device_settings(&self) -> DeviceSettings {
        DeviceSettings {
            source: self.camera.source,
            width: self.camera.width,
            height: self.camera.height,
            fps: self.camera.fps,
        }
    }

    pub fn motion_settings(&self) -> MotionSettings {
        MotionSettings {
            contour_area: self.camera.motion_contour_area,
            pixel_threshold: self.motion.pixel_threshold,
            blur_sigma: self.motion.blur_sigma,
            dilate_iterations: self.motion.dilate_iterations,
            reference_blend: self.motion.reference_blend,
        }
    }

    pub fn snapshot_settings(&self) -> SnapshotSettings {
        SnapshotSettings::under(
            &self.storage_path(),
            self.camera.motion_detection,
            self.record.snapshot_quality,
        )
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            device: self.device_settings(),
            motion_enabled: self.camera.motion_detection,
            motion_check_interval: self.camera.motion_check_interval,
            motion: self.motion_settings(),
            snapshot: self.snapshot_settings(),
            jpeg_quality: self.camera.jpeg_quality,
            read_backoff: READ_BACKOFF,
        }
    }

    pub fn recorder_settings(&self) -> RecorderSettings {
        RecorderSettings {
            enabled: self.record.enabled,
            clip_length: Duration::from_secs(self.record.recording_length.saturating_mul(60)),
            storage_path: self.storage_path(),
            retention_days: self.record.video_retention,
            retention_interval: Duration::from_secs(self.record.retention_interval_secs.max(1)),
            jpeg_quality: self.camera.jpeg_quality,
        }
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            subscribe_timeout: Duration::from_millis(self.server.subscribe_timeout_ms),
            backlog: self.server.backlog,
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            cameras: self.camera.devices.clone(),
            capture: self.capture_settings(),
            recorder: self.recorder_settings(),
            broadcast: self.broadcast_settings(),
            open_attempts: self.camera.device_open_attempts,
            retry_delay: Duration::from_millis(self.camera.device_retry_ms),
        }
    }

    pub fn server_settings(&self) -> ServerSettings {
        let credentials = match (&self.server.username, &self.server.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };
        ServerSettings {
            bind: format!("{}:{}", self.server.host, self.server.port),
            subscribe_timeout: Duration::from_millis(self.server.subscribe_timeout_ms),
            max_idle_timeouts: self.server.max_idle_timeouts,
            credentials,
            storage_path: self.storage_path(),
            resolution: (self.camera.width, self.camera.height),
            fps: self.camera.fps,
        }
    }
}
