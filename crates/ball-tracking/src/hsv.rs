//! HSV images and ranges in the 8-bit OpenCV convention.
//!
//! Hue is stored as degrees / 2 in `[0, 180)`, saturation and value in `[0, 255]`.

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Three-channel image whose channels are H, S, V.
pub type HsvImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

pub const HUE_MAX: u8 = 180;

/// Convert one RGB pixel to HSV.
pub fn rgb_to_hsv_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u16 % u16::from(HUE_MAX);
    [h as u8, s.round() as u8, max as u8]
}

pub fn rgb_to_hsv(image: &RgbImage) -> HsvImage {
    let mut out = HsvImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = Rgb(rgb_to_hsv_pixel(src.0));
    }
    out
}

/// Inclusive per-channel HSV bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub min: [u8; 3],
    pub max: [u8; 3],
}

impl HsvRange {
    pub const fn new(min: [u8; 3], max: [u8; 3]) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.min[c] <= hsv[c] && hsv[c] <= self.max[c])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_follow_opencv_convention() {
        assert_eq!(rgb_to_hsv_pixel([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv_pixel([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv_pixel([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv_pixel([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv_pixel([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn magenta_side_of_red_stays_below_hue_max() {
        assert_eq!(rgb_to_hsv_pixel([255, 0, 40])[0], 175);
        assert!(rgb_to_hsv_pixel([255, 0, 1])[0] < HUE_MAX);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = HsvRange::new([10, 100, 100], [20, 255, 255]);
        assert!(range.contains([10, 100, 100]));
        assert!(range.contains([20, 255, 255]));
        assert!(!range.contains([21, 200, 200]));
        assert!(!range.contains([15, 99, 200]));
    }
}
