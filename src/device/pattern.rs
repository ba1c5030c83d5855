use image::{Rgb, RgbImage};
use rand::Rng;
use rand::rngs::ThreadRng;

use crate::core::{CameraId, DeviceError};
use crate::frame::RawFrame;

use super::{CaptureDevice, DeviceSettings};

const NOISE: i16 = 6;

/// Synthetic camera: a gradient background with a block sliding across it
/// and a little sensor noise on top.
pub struct PatternDevice {
    camera: CameraId,
    width: u32,
    height: u32,
    tick: u64,
    rng: ThreadRng,
    released: bool,
}

impl PatternDevice {
    pub fn new(camera: CameraId, settings: &DeviceSettings) -> Self {
        Self {
            camera,
            width: settings.width.max(1),
            height: settings.height.max(1),
            tick: 0,
            rng: rand::thread_rng(),
            released: false,
        }
    }

    fn render(&mut self) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let block = (w.min(h) / 6).max(1);
        let travel = w.saturating_sub(block).max(1) as u64;
        let bx = ((self.tick * 4) % travel) as u32;
        let by = h.saturating_sub(block) / 2;

        let mut img = RgbImage::new(w, h);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let base = if x >= bx && x < bx + block && y >= by && y < by + block {
                [230u8, 230, 230]
            } else {
                let g = (x * 160 / w) as u8 + 40;
                let b = (y * 120 / h) as u8 + 60;
                [40, g, b]
            };
            let n = self.rng.gen_range(-NOISE..=NOISE);
            *px = Rgb(base.map(|c| (c as i16 + n).clamp(0, 255) as u8));
        }
        img
    }
}

impl CaptureDevice for PatternDevice {
    fn read(&mut self) -> Result<RawFrame, DeviceError> {
        if self.released {
            return Err(DeviceError::transient(self.camera, "device released"));
        }
        let image = self.render();
        self.tick += 1;
        Ok(RawFrame::new(image))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> PatternDevice {
        PatternDevice::new(
            CameraId(0),
            &DeviceSettings {
                width: 64,
                height: 48,
                ..DeviceSettings::default()
            },
        )
    }

    #[test]
    fn block_moves_between_frames() {
        let mut dev = device();
        let a = dev.read().unwrap();
        for _ in 0..3 {
            dev.read().unwrap();
        }
        let b = dev.read().unwrap();

        // Zeile durch die Mitte des Blocks
        let y = 48 / 2;
        let bright = |f: &RawFrame| {
            (0..64)
                .filter(|x| f.image.get_pixel(*x, y).0[0] > 200)
                .min()
                .unwrap()
        };
        assert!(bright(&b) > bright(&a));
    }

    #[test]
    fn read_after_release_is_transient() {
        let mut dev = device();
        dev.release();
        assert!(dev.read().unwrap_err().is_transient());
    }
}
