// src/http/mjpeg.rs
use std::io::{self, Read};

use crate::broadcast::{SubscribeRead, Subscription};
use crate::core::CameraId;
use crate::frame::EncodedFrame;

pub const BOUNDARY: &str = "frame";

pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", BOUNDARY)
}

/// One multipart part around a JPEG.
pub fn part(jpeg: &[u8]) -> Vec<u8> {
    let head = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut out = Vec::with_capacity(head.len() + jpeg.len() + 2);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(jpeg);
    out.extend_from_slice(b"\r\n");
    out
}

/// Response body that pulls frames from a subscription as the socket
/// drains. The broadcaster lock is only held inside `recv`, never while
/// bytes go out.
pub struct MjpegBody {
    sub: Subscription,
    first: Option<EncodedFrame>,
    pending: Vec<u8>,
    pos: usize,
    idle: u32,
    max_idle: u32,
    frames_sent: u64,
    // seq of the last part loaded, never sent twice
    last_seq: u64,
    done: bool,
}

impl MjpegBody {
    /// `first` is sent before waiting on the subscription. `max_idle`
    /// consecutive timeouts end the stream; 0 never ends it on idle.
    pub fn new(sub: Subscription, first: Option<EncodedFrame>, max_idle: u32) -> Self {
        Self {
            sub,
            first,
            pending: Vec::new(),
            pos: 0,
            idle: 0,
            max_idle,
            frames_sent: 0,
            last_seq: 0,
            done: false,
        }
    }

    pub fn camera(&self) -> CameraId {
        self.sub.camera()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    fn load(&mut self, frame: &EncodedFrame) {
        if frame.seq <= self.last_seq {
            return;
        }
        self.last_seq = frame.seq;
        self.pending = part(&frame.bytes);
        self.pos = 0;
        self.frames_sent += 1;
    }

    fn fill(&mut self) {
        if let Some(frame) = self.first.take() {
            self.load(&frame);
            return;
        }

        match self.sub.recv() {
            SubscribeRead::Frame(frame) => {
                self.idle = 0;
                self.load(&frame);
            }
            SubscribeRead::Timeout => {
                self.idle += 1;
                if self.max_idle > 0 && self.idle >= self.max_idle {
                    log::debug!("[http:{}] viewer idle, ending stream", self.sub.camera());
                    self.done = true;
                }
            }
            SubscribeRead::Closed => self.done = true,
        }
    }
}

impl Read for MjpegBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.pending.len() {
            if self.done {
                return Ok(0);
            }
            self.fill();
        }

        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for MjpegBody {
    fn drop(&mut self) {
        log::info!(
            "[http:{}] viewer disconnected after {} frames",
            self.sub.camera(),
            self.frames_sent
        );
    }
}
