use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::core::MediaError;

use super::RawFrame;

#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &RawFrame) -> Result<Vec<u8>, MediaError> {
        self.encode_image(&frame.image)
    }

    pub fn encode_image(&self, image: &RgbImage) -> Result<Vec<u8>, MediaError> {
        // grobe Schätzung, spart Reallokationen
        let mut out = Vec::with_capacity(image.width() as usize * image.height() as usize / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode_image(image)
            .map_err(MediaError::Encode)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<RgbImage, MediaError> {
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
            .map(|img| img.to_rgb8())
            .map_err(MediaError::Decode)
    }
}
