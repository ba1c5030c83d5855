//! Frame-difference motion classifier, one instance per camera.

pub mod ops;

use std::time::Instant;

use image::{GrayImage, Rgb};

use crate::frame::{RawFrame, Region, draw_rect};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct MotionSettings {
    /// Minimum pixel area a changed region must exceed to count as motion.
    pub contour_area: u32,
    pub pixel_threshold: u8,
    pub blur_sigma: f32,
    pub dilate_iterations: u32,
    /// Weight of the new frame when updating the reference; 1.0 replaces it.
    pub reference_blend: f32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            contour_area: 500,
            pixel_threshold: 25,
            blur_sigma: 3.5,
            dilate_iterations: 2,
            reference_blend: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionState {
    pub active: bool,
    pub last_change: Option<Instant>,
}

#[derive(Debug)]
pub struct Detection {
    pub active: bool,
    /// Union of all qualifying regions.
    pub region: Option<Region>,
    /// The input frame, with the merged box drawn when motion was found.
    pub frame: RawFrame,
}

pub struct MotionAnalyzer {
    settings: MotionSettings,
    reference: Option<GrayImage>,
    state: MotionState,
}

impl MotionAnalyzer {
    pub fn new(settings: MotionSettings) -> Self {
        Self {
            settings,
            reference: None,
            state: MotionState::default(),
        }
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Forgets the reference; the next call starts cold again.
    pub fn reset(&mut self) {
        self.reference = None;
        self.set_active(false);
    }

    pub fn detect(&mut self, mut frame: RawFrame) -> Detection {
        let gray = ops::preprocess(&frame.image, self.settings.blur_sigma);

        let reference = match self.reference.as_mut() {
            Some(r) if r.dimensions() == gray.dimensions() => r,
            _ => {
                // cold start (or resolution change): only seed the reference
                self.reference = Some(gray);
                self.set_active(false);
                return Detection {
                    active: false,
                    region: None,
                    frame,
                };
            }
        };

        let mask = ops::diff_mask(reference, &gray, self.settings.pixel_threshold);
        let mask = ops::dilate(&mask, self.settings.dilate_iterations);

        let min_area = self.settings.contour_area as usize;
        let region = ops::connected_regions(&mask)
            .into_iter()
            .filter(|blob| blob.area > min_area)
            .map(|blob| blob.bounds)
            .reduce(Region::merge);

        if self.settings.reference_blend >= 1.0 {
            *reference = gray;
        } else {
            ops::blend_into(reference, &gray, self.settings.reference_blend);
        }

        if let Some(region) = region {
            draw_rect(&mut frame.image, region, BOX_COLOR, BOX_THICKNESS);
        }

        let active = region.is_some();
        self.set_active(active);
        Detection {
            active,
            region,
            frame,
        }
    }

    fn set_active(&mut self, active: bool) {
        if self.state.active != active {
            self.state.active = active;
            self.state.last_change = Some(Instant::now());
        }
    }
}
