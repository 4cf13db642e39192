//! Per-color blob detection on HSV frames.

use image::{GrayImage, Luma, imageops::FilterType};
use imageproc::{
    contours::{BorderType, Contour, find_contours},
    distance_transform::Norm,
    morphology,
};

use crate::{hsv::HsvImage, observation::Point2, profile::ColorProfile};

pub const DEFAULT_MIN_CONTOUR_AREA: f64 = 100.0;

/// Opening/closing kernel at full resolution: a radius-2 disk, the digital
/// counterpart of a 5x5 ellipse.
const FULL_SCALE_KERNEL: (Norm, u8) = (Norm::L2, 2);
/// Kernel for downscaled masks: a radius-1 diamond.
const DOWNSCALED_KERNEL: (Norm, u8) = (Norm::L1, 1);

/// A surviving contour: centroid in full-resolution pixel coordinates and
/// enclosed area in full-resolution square pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blob {
    pub center: Point2,
    pub area: f64,
}

#[derive(Clone, Debug)]
pub struct ColorDetector {
    min_contour_area: f64,
}

impl Default for ColorDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONTOUR_AREA)
    }
}

impl ColorDetector {
    pub fn new(min_contour_area: f64) -> Self {
        Self { min_contour_area }
    }

    /// Binary mask (255 = member) of pixels inside the profile's ranges.
    pub fn mask(hsv: &HsvImage, profile: &ColorProfile) -> GrayImage {
        let mut mask = GrayImage::new(hsv.width(), hsv.height());
        for (src, dst) in hsv.pixels().zip(mask.pixels_mut()) {
            if profile.matches(src.0) {
                *dst = Luma([255]);
            }
        }
        mask
    }

    /// Detect blobs of one color. `downscale` in `(0, 1]` trades accuracy for speed.
    pub fn detect(&self, hsv: &HsvImage, profile: &ColorProfile, downscale: f64) -> Vec<Blob> {
        let full_scale = !(downscale > 0.0 && downscale < 1.0);
        let (working, scale, kernel) = if full_scale {
            (None, 1.0, FULL_SCALE_KERNEL)
        } else {
            let width = ((f64::from(hsv.width()) * downscale).round() as u32).max(1);
            let height = ((f64::from(hsv.height()) * downscale).round() as u32).max(1);
            let resized = image::imageops::resize(hsv, width, height, FilterType::Triangle);
            (Some(resized), downscale, DOWNSCALED_KERNEL)
        };
        let source = working.as_ref().unwrap_or(hsv);

        let mask = denoise(&Self::mask(source, profile), kernel);

        let min_area = self.min_contour_area * scale * scale;
        find_contours::<i32>(&mask)
            .iter()
            .filter(|contour| is_external(contour))
            .filter_map(polygon_moments)
            .filter(|m| m.area() > min_area)
            .map(|m| Blob {
                center: Point2::new((m.cx() / scale) as f32, (m.cy() / scale) as f32),
                area: m.area() / (scale * scale),
            })
            .collect()
    }
}

/// Morphological open then close: drops specks, fills pinholes.
fn denoise(mask: &GrayImage, (norm, radius): (Norm, u8)) -> GrayImage {
    let opened = morphology::open(mask, norm, radius);
    morphology::close(&opened, norm, radius)
}

fn is_external(contour: &Contour<i32>) -> bool {
    matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none()
}

/// Zeroth and first order moments of a closed polygon.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
}

impl Moments {
    fn area(&self) -> f64 {
        self.m00
    }

    fn cx(&self) -> f64 {
        self.m10 / self.m00
    }

    fn cy(&self) -> f64 {
        self.m01 / self.m00
    }
}

/// Green's theorem moments over the contour polygon, oriented so `m00 >= 0`.
/// Degenerate contours (fewer than three points or zero area) yield `None`.
fn polygon_moments(contour: &Contour<i32>) -> Option<Moments> {
    let points = &contour.points;
    if points.len() < 3 {
        return None;
    }
    let (mut a00, mut a10, mut a01) = (0.0f64, 0.0f64, 0.0f64);
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let (x0, y0) = (f64::from(p.x), f64::from(p.y));
        let (x1, y1) = (f64::from(q.x), f64::from(q.y));
        let cross = x0 * y1 - x1 * y0;
        a00 += cross;
        a10 += cross * (x0 + x1);
        a01 += cross * (y0 + y1);
    }
    let sign = if a00 < 0.0 { -1.0 } else { 1.0 };
    let m00 = sign * a00 / 2.0;
    if m00 <= 0.0 {
        return None;
    }
    Some(Moments {
        m00,
        m10: sign * a10 / 6.0,
        m01: sign * a01 / 6.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hsv::{HsvRange, rgb_to_hsv},
        profile::ColorTable,
    };
    use image::{Rgb, RgbImage};

    fn scene(squares: &[(u32, u32, u32, [u8; 3])]) -> HsvImage {
        let mut rgb = RgbImage::from_pixel(200, 160, Rgb([30, 30, 30]));
        for &(x0, y0, side, color) in squares {
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    rgb.put_pixel(x, y, Rgb(color));
                }
            }
        }
        rgb_to_hsv(&rgb)
    }

    #[test]
    fn finds_centroid_of_large_blob_and_ignores_small_one() {
        let hsv = scene(&[(40, 40, 30, [0, 200, 0]), (150, 100, 6, [0, 200, 0])]);
        let green = ColorTable::starter().get("green").unwrap().clone();

        let blobs = ColorDetector::default().detect(&hsv, &green, 1.0);
        assert_eq!(blobs.len(), 1);
        let blob = blobs[0];
        assert!((blob.center.x - 54.5).abs() < 1.0, "{:?}", blob.center);
        assert!((blob.center.y - 54.5).abs() < 1.0, "{:?}", blob.center);
        assert!(blob.area > 700.0 && blob.area < 900.0, "area {}", blob.area);
    }

    #[test]
    fn other_colors_do_not_match() {
        let hsv = scene(&[(40, 40, 30, [255, 90, 0])]);
        let green = ColorTable::starter().get("green").unwrap().clone();
        assert!(ColorDetector::default().detect(&hsv, &green, 1.0).is_empty());
    }

    #[test]
    fn downscaled_centers_map_back_to_full_resolution() {
        let hsv = scene(&[(100, 60, 40, [0, 200, 0])]);
        let green = ColorTable::starter().get("green").unwrap().clone();

        let blobs = ColorDetector::default().detect(&hsv, &green, 0.5);
        assert_eq!(blobs.len(), 1);
        let center = blobs[0].center;
        assert!((center.x - 119.5).abs() < 2.0, "{center:?}");
        assert!((center.y - 79.5).abs() < 2.0, "{center:?}");
    }

    #[test]
    fn secondary_range_catches_wrapped_hue() {
        // (255, 0, 40) sits at hue 175, only reachable through the secondary band.
        let hsv = scene(&[(20, 20, 30, [255, 0, 40])]);
        let red = ColorProfile::new("red", HsvRange::new([0, 150, 100], [8, 255, 255]));
        assert!(ColorDetector::default().detect(&hsv, &red, 1.0).is_empty());

        let wrapped = red.with_secondary(HsvRange::new([170, 150, 100], [180, 255, 255]));
        assert_eq!(ColorDetector::default().detect(&hsv, &wrapped, 1.0).len(), 1);
    }

    #[test]
    fn mask_marks_members() {
        let hsv = scene(&[(0, 0, 2, [0, 200, 0])]);
        let green = ColorTable::starter().get("green").unwrap().clone();
        let mask = ColorDetector::mask(&hsv, &green);
        assert_eq!(mask.get_pixel(1, 1).0, [255]);
        assert_eq!(mask.get_pixel(5, 5).0, [0]);
    }

    #[test]
    fn full_scale_cleanup_rounds_square_corners() {
        let mut mask = GrayImage::new(20, 20);
        for y in 5..10 {
            for x in 5..10 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let cleaned = denoise(&mask, FULL_SCALE_KERNEL);
        assert_eq!(cleaned.get_pixel(7, 7).0, [255]);
        assert_eq!(cleaned.get_pixel(7, 5).0, [255]);
        assert_eq!(cleaned.get_pixel(5, 5).0, [0]);
        assert_eq!(cleaned.get_pixel(9, 9).0, [0]);

        // A 2-pixel-wide line cannot contain the disk and is erased.
        let mut line = GrayImage::new(20, 20);
        for x in 2..18 {
            line.put_pixel(x, 9, Luma([255]));
            line.put_pixel(x, 10, Luma([255]));
        }
        assert!(denoise(&line, FULL_SCALE_KERNEL).pixels().all(|p| p.0 == [0]));
    }
}
