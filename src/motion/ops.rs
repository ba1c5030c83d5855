//! Grayscale image operations used by the motion analyzer.

use image::{GrayImage, RgbImage, imageops};

use crate::frame::Region;

/// Single-intensity, noise-suppressed copy of `image`.
pub fn preprocess(image: &RgbImage, blur_sigma: f32) -> GrayImage {
    let gray = imageops::grayscale(image);
    if blur_sigma > 0.0 {
        imageops::blur(&gray, blur_sigma)
    } else {
        gray
    }
}

/// Binary mask, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.bits[(y * self.width + x) as usize] = value;
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }
}

/// Pixels whose absolute difference exceeds `threshold`.
pub fn diff_mask(reference: &GrayImage, current: &GrayImage, threshold: u8) -> Mask {
    let (w, h) = current.dimensions();
    let mut mask = Mask::new(w, h);
    for (dst, (a, b)) in mask
        .bits
        .iter_mut()
        .zip(reference.as_raw().iter().zip(current.as_raw().iter()))
    {
        *dst = a.abs_diff(*b) > threshold;
    }
    mask
}

/// Dilates with a 3x3 square element, `iterations` times.
pub fn dilate(mask: &Mask, iterations: u32) -> Mask {
    let mut current = mask.clone();
    for _ in 0..iterations {
        let mut next = Mask::new(current.width, current.height);
        for y in 0..current.height {
            for x in 0..current.width {
                if !current.get(x, y) {
                    continue;
                }
                let x0 = x.saturating_sub(1);
                let y0 = y.saturating_sub(1);
                let x1 = (x + 1).min(current.width - 1);
                let y1 = (y + 1).min(current.height - 1);
                for ny in y0..=y1 {
                    for nx in x0..=x1 {
                        next.set(nx, ny, true);
                    }
                }
            }
        }
        current = next;
    }
    current
}

/// One 8-connected group of set pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    pub area: usize,
    pub bounds: Region,
}

pub fn connected_regions(mask: &Mask) -> Vec<Blob> {
    let (w, h) = (mask.width, mask.height);
    let mut visited = vec![false; mask.bits.len()];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.bits.len() {
        if !mask.bits[start] || visited[start] {
            continue;
        }

        let (sx, sy) = ((start as u32) % w, (start as u32) / w);
        let mut blob = Blob {
            area: 0,
            bounds: Region::point(sx, sy),
        };
        visited[start] = true;
        stack.push((sx, sy));

        while let Some((x, y)) = stack.pop() {
            blob.area += 1;
            blob.bounds.include(x, y);

            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    let idx = (ny * w + nx) as usize;
                    if mask.bits[idx] && !visited[idx] {
                        visited[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
        }
        blobs.push(blob);
    }

    blobs
}

/// Blends `current` into `reference` with weight `alpha` for the new frame.
pub fn blend_into(reference: &mut GrayImage, current: &GrayImage, alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (r, c) in reference.iter_mut().zip(current.iter()) {
        let mixed = *r as f32 * (1.0 - alpha) + *c as f32 * alpha;
        *r = mixed.round() as u8;
    }
}
