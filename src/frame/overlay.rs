//! Overlay drawing: status line and motion box.
//!
//! The status line uses a built-in 5x7 bitmap font so no font files
//! need to ship with the node.

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::core::CameraId;
use crate::core::timestamp::overlay_stamp;

use super::RawFrame;

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const TEXT_SCALE: u32 = 2;
const TEXT_ORIGIN: (u32, u32) = (10, 10);
const OUTLINE: i64 = 2;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Axis-aligned box in pixel coordinates, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Region {
    pub fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Smallest box enclosing both.
    pub fn merge(self, other: Region) -> Region {
        Region {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn contains(&self, other: &Region) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }
}

pub fn overlay_text(camera: CameraId, at: &DateTime<Local>, motion: bool) -> String {
    let status = if motion { "MOTION" } else { "OK." };
    format!("CAM {} {} {}", camera.0, overlay_stamp(at), status)
}

/// Draws the status line onto the frame in place.
pub fn draw_overlay(frame: &mut RawFrame, camera: CameraId, motion: bool) {
    let text = overlay_text(camera, &frame.wall_time, motion);
    let (x, y) = (TEXT_ORIGIN.0 as i64, TEXT_ORIGIN.1 as i64);

    for dy in -OUTLINE..=OUTLINE {
        for dx in -OUTLINE..=OUTLINE {
            if dx != 0 || dy != 0 {
                draw_text(&mut frame.image, &text, x + dx, y + dy, BLACK);
            }
        }
    }
    draw_text(&mut frame.image, &text, x, y, WHITE);
}

/// Draws an unfilled rectangle, clipped to the image.
pub fn draw_rect(image: &mut RgbImage, region: Region, color: Rgb<u8>, thickness: u32) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || region.min_x >= w || region.min_y >= h {
        return;
    }
    let max_x = region.max_x.min(w - 1);
    let max_y = region.max_y.min(h - 1);

    for t in 0..thickness {
        let top = region.min_y.saturating_add(t);
        let bottom = max_y.saturating_sub(t);
        let left = region.min_x.saturating_add(t);
        let right = max_x.saturating_sub(t);
        if top > bottom || left > right {
            break;
        }
        for x in left..=right {
            image.put_pixel(x, top, color);
            image.put_pixel(x, bottom, color);
        }
        for y in top..=bottom {
            image.put_pixel(left, y, color);
            image.put_pixel(right, y, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, text: &str, x: i64, y: i64, color: Rgb<u8>) {
    let advance = ((GLYPH_W + 1) * TEXT_SCALE) as i64;
    for (i, ch) in text.chars().enumerate() {
        draw_glyph(image, glyph(ch), x + i as i64 * advance, y, color);
    }
}

fn draw_glyph(image: &mut RgbImage, rows: [u8; GLYPH_H as usize], x: i64, y: i64, color: Rgb<u8>) {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let scale = TEXT_SCALE as i64;

    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_W {
            if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let px = x + col as i64 * scale + sx;
                    let py = y + row as i64 * scale + sy;
                    if (0..w).contains(&px) && (0..h).contains(&py) {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; GLYPH_H as usize] {
    match ch.to_ascii_uppercase() {
        ' ' => [0x00; 7],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
