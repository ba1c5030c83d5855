// Video4Linux capture, enabled with the `v4l2` feature.

use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

use crate::core::{CameraId, DeviceError};
use crate::frame::{JpegCodec, RawFrame};

use super::{CaptureDevice, DeviceSettings};

const BUFFER_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Mjpg,
    Yuyv,
}

pub struct V4l2Device {
    camera: CameraId,
    width: u32,
    height: u32,
    encoding: Encoding,
    stream: Option<Stream<'static>>,
    _device: Device,
}

impl V4l2Device {
    /// Opens `/dev/video<camera>` and asks for MJPG at the configured size
    /// and rate, falling back to YUYV.
    pub fn open(camera: CameraId, settings: &DeviceSettings) -> Result<Self, DeviceError> {
        let dev = Device::new(camera.0 as usize)
            .map_err(|e| DeviceError::open(camera, format!("/dev/video{}: {}", camera.0, e)))?;

        let mjpg = FourCC::new(b"MJPG");
        let yuyv = FourCC::new(b"YUYV");

        let actual = match dev.set_format(&Format::new(settings.width, settings.height, mjpg)) {
            Ok(f) if f.fourcc == mjpg => f,
            _ => dev
                .set_format(&Format::new(settings.width, settings.height, yuyv))
                .map_err(|e| DeviceError::open(camera, format!("set format: {}", e)))?,
        };

        let encoding = if actual.fourcc == mjpg {
            Encoding::Mjpg
        } else if actual.fourcc == yuyv {
            Encoding::Yuyv
        } else {
            return Err(DeviceError::UnsupportedFormat {
                camera,
                format: actual.fourcc.to_string(),
            });
        };

        if let Err(e) = dev.set_params(&Parameters::with_fps(settings.fps)) {
            log::warn!("[v4l2:{}] could not set {} fps: {}", camera, settings.fps, e);
        }

        let stream = Stream::with_buffers(&dev, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| DeviceError::open(camera, format!("stream: {}", e)))?;

        log::info!(
            "[v4l2:{}] {}x{} {:?}",
            camera,
            actual.width,
            actual.height,
            encoding
        );

        Ok(Self {
            camera,
            width: actual.width,
            height: actual.height,
            encoding,
            stream: Some(stream),
            _device: dev,
        })
    }
}

impl CaptureDevice for V4l2Device {
    fn read(&mut self) -> Result<RawFrame, DeviceError> {
        let camera = self.camera;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DeviceError::transient(camera, "device released"))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| DeviceError::transient(camera, e.to_string()))?;
        let data = &buf[..(meta.bytesused as usize).min(buf.len())];

        let image = match self.encoding {
            Encoding::Mjpg => JpegCodec::decode(data)
                .map_err(|e| DeviceError::transient(camera, e.to_string()))?,
            Encoding::Yuyv => yuyv_to_rgb(data, self.width, self.height)
                .ok_or_else(|| DeviceError::transient(camera, "short YUYV buffer"))?,
        };
        Ok(RawFrame::new(image))
    }

    fn release(&mut self) {
        // Stream zuerst schließen, dann das Gerät
        self.stream = None;
    }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let needed = (width * height * 2) as usize;
    if data.len() < needed {
        return None;
    }

    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for px in data[..needed].chunks_exact(4) {
        let (y0, u, y1, v) = (px[0] as f32, px[1] as f32 - 128.0, px[2] as f32, px[3] as f32 - 128.0);
        for y in [y0, y1] {
            let r = y + 1.402 * v;
            let g = y - 0.344 * u - 0.714 * v;
            let b = y + 1.772 * u;
            out.extend([r, g, b].map(|c| c.clamp(0.0, 255.0) as u8));
        }
    }
    RgbImage::from_raw(width, height, out)
}
