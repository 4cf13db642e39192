//! Pixel plus depth to camera-space position.

use depth_ingest::{DepthMap, DistortionModel, Intrinsics};

use crate::observation::{Point2, Point3};

pub const DEFAULT_PATCH_SIZE: u32 = 5;
pub const DEFAULT_MAX_DEPTH_M: f32 = 3.0;

/// A localized center: averaged depth and the deprojected point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Located {
    pub depth_m: f32,
    pub world: Point3,
}

#[derive(Clone, Copy, Debug)]
pub struct Localizer {
    patch_size: u32,
    max_depth_m: f32,
}

impl Default for Localizer {
    fn default() -> Self {
        Self::new(DEFAULT_PATCH_SIZE, DEFAULT_MAX_DEPTH_M)
    }
}

impl Localizer {
    pub fn new(patch_size: u32, max_depth_m: f32) -> Self {
        Self {
            patch_size: patch_size.max(1),
            max_depth_m,
        }
    }

    /// Mean of the strictly positive samples in a square patch centered on
    /// `(x, y)`, clamped to the map. Zero when no sample is valid.
    pub fn averaged_depth(&self, depth: &DepthMap, x: u32, y: u32) -> f32 {
        if depth.width() == 0 || depth.height() == 0 {
            return 0.0;
        }
        let half = self.patch_size / 2;
        let x0 = x.saturating_sub(half);
        let y0 = y.saturating_sub(half);
        let x1 = (x + half).min(depth.width() - 1);
        let y1 = (y + half).min(depth.height() - 1);

        let mut sum = 0.0f64;
        let mut count = 0u32;
        for py in y0..=y1 {
            for px in x0..=x1 {
                let meters = depth.distance(px, py);
                if meters > 0.0 {
                    sum += f64::from(meters);
                    count += 1;
                }
            }
        }
        if count == 0 { 0.0 } else { (sum / f64::from(count)) as f32 }
    }

    /// Camera-space position of `center`, or `None` when the pixel is off the
    /// map or its depth is not trusted.
    pub fn localize(&self, depth: &DepthMap, intrinsics: &Intrinsics, center: Point2) -> Option<Located> {
        if center.x < 0.0 || center.y < 0.0 {
            return None;
        }
        let (x, y) = (center.x as u32, center.y as u32);
        if x >= depth.width() || y >= depth.height() {
            return None;
        }
        let depth_m = self.averaged_depth(depth, x, y);
        if !(depth_m > 0.0 && depth_m < self.max_depth_m) {
            return None;
        }
        Some(Located {
            depth_m,
            world: deproject(intrinsics, center, depth_m),
        })
    }
}

/// Back-project a pixel at a known depth through the intrinsics.
pub fn deproject(intrinsics: &Intrinsics, pixel: Point2, depth_m: f32) -> Point3 {
    let mut x = (pixel.x - intrinsics.ppx) / intrinsics.fx;
    let mut y = (pixel.y - intrinsics.ppy) / intrinsics.fy;

    if intrinsics.model == DistortionModel::InverseBrownConrady {
        let c = intrinsics.coeffs;
        let r2 = x * x + y * y;
        let radial = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
        let ux = x * radial + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
        let uy = y * radial + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
        x = ux;
        y = uy;
    }

    Point3 {
        x: depth_m * x,
        y: depth_m * y,
        z: depth_m,
    }
}
