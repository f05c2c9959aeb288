//! Synthetic capture source: a moving color-bar pattern encoded as JPEG

use super::CaptureSource;
use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Eight classic color bars
const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Test pattern generator; the bars scroll one step per frame
pub struct TestPatternSource {
    width: u32,
    height: u32,
    quality: u8,
    frame: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            quality: quality.clamp(1, 100),
            frame: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let shift = self.frame.wrapping_mul(4);
        // Bottom eighth is a frame counter strip so successive frames differ
        let strip_top = self.height - self.height / 8;

        RgbImage::from_fn(self.width, self.height, |x, y| {
            if y >= strip_top {
                let level = ((x + shift) % 256) as u8;
                return Rgb([level, level, level]);
            }
            let bar = (((x + shift) / bar_width) as usize) % BARS.len();
            Rgb(BARS[bar])
        })
    }
}

impl CaptureSource for TestPatternSource {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        let image = self.render();
        self.frame = self.frame.wrapping_add(1);

        let mut jpeg = Vec::with_capacity(self.width.saturating_mul(self.height) as usize / 4);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&image)?;
        Ok(jpeg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_jpeg() {
        let mut source = TestPatternSource::new(64, 48, 60);
        let jpeg = source.capture().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 64);
        assert_eq!(decoded.height(), 48);
    }

    #[test]
    fn test_pattern_moves() {
        let mut source = TestPatternSource::new(64, 48, 60);
        let first = source.render();
        source.capture().unwrap();
        assert_ne!(first, source.render());
    }
}
