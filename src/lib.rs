// src/lib.rs
pub mod broadcast;
pub mod capture;
pub mod config;
pub mod core;
pub mod device;
pub mod frame;
pub mod http;
pub mod motion;
pub mod recorder;
pub mod reload;
pub mod supervisor;
pub mod testing;

// Re-export die wichtigsten Typen
pub use broadcast::{FrameBroadcaster, SubscribeRead, Subscription, Update};
pub use capture::{CaptureLoop, CaptureStatus, LoopState};
pub use config::Config;
pub use core::{CameraId, ComponentLogger, LogContext};
pub use supervisor::CaptureSupervisor;
