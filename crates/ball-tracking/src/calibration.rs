//! Click-to-calibrate: derive a profile's HSV range from a sampled neighborhood.

use thiserror::Error;
use tracing::debug;

use crate::{
    hsv::{HUE_MAX, HsvImage, HsvRange},
    profile::ColorTable,
};

/// Hue span kept on either side of the wrap point.
const WRAP_BAND: f64 = 15.0;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no color profile named {0:?}")]
    UnknownProfile(String),
    #[error("click ({x}, {y}) is outside the {width}x{height} image")]
    OutsideImage { x: i32, y: i32, width: u32, height: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationSettings {
    /// Side of the sampled square, in pixels.
    pub neighborhood: u32,
    /// Half-widths of the new range around the sampled mean (H, S, V).
    pub tolerance: [f64; 3],
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            neighborhood: 5,
            tolerance: [8.0, 40.0, 40.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationReport {
    pub mean: [f64; 3],
    pub stddev: [f64; 3],
    pub wrapped: bool,
    pub primary: HsvRange,
    pub secondary: Option<HsvRange>,
}

/// Resample `name`'s range around the clicked pixel and store it in `table`.
pub fn calibrate(
    table: &mut ColorTable,
    name: &str,
    hsv: &HsvImage,
    click: (i32, i32),
    settings: &CalibrationSettings,
) -> Result<CalibrationReport, CalibrationError> {
    let profile = table
        .get_mut(name)
        .ok_or_else(|| CalibrationError::UnknownProfile(name.to_string()))?;

    let (x, y) = click;
    if x < 0 || y < 0 || x as u32 >= hsv.width() || y as u32 >= hsv.height() {
        return Err(CalibrationError::OutsideImage {
            x,
            y,
            width: hsv.width(),
            height: hsv.height(),
        });
    }

    let (mean, stddev) = sample_statistics(hsv, x as u32, y as u32, settings.neighborhood);
    let [tol_h, tol_s, tol_v] = settings.tolerance;
    let hue_max = f64::from(HUE_MAX);

    let bound = |value: f64, upper: f64| value.clamp(0.0, upper).round() as u8;
    let s_lo = bound(mean[1] - tol_s, 255.0);
    let s_hi = bound(mean[1] + tol_s, 255.0);
    let v_lo = bound(mean[2] - tol_v, 255.0);
    let v_hi = bound(mean[2] + tol_v, 255.0);
    let h = mean[0];
    let band = |h_lo: f64, h_hi: f64| {
        HsvRange::new(
            [bound(h_lo, hue_max), s_lo, v_lo],
            [bound(h_hi, hue_max), s_hi, v_hi],
        )
    };

    let wrap = profile.hue_wrap.and_then(|rule| {
        if h <= f64::from(rule.low_max) {
            Some((
                band((h - tol_h).max(0.0), (h + tol_h).min(WRAP_BAND)),
                band((hue_max - tol_h).max(hue_max - WRAP_BAND), hue_max),
            ))
        } else if rule.high_min.is_some_and(|high| h >= f64::from(high)) {
            Some((
                band((h - tol_h).max(hue_max - WRAP_BAND), hue_max),
                band(0.0, tol_h.min(WRAP_BAND)),
            ))
        } else {
            None
        }
    });

    let (primary, secondary) = match wrap {
        Some((primary, secondary)) => (primary, Some(secondary)),
        None => (band(h - tol_h, h + tol_h), None),
    };
    profile.primary = primary;
    profile.secondary = secondary;

    debug!(
        profile = name,
        ?mean,
        ?stddev,
        wrapped = secondary.is_some(),
        "calibrated color profile"
    );
    Ok(CalibrationReport {
        mean,
        stddev,
        wrapped: secondary.is_some(),
        primary,
        secondary,
    })
}

/// Per-channel mean and population standard deviation over a square
/// neighborhood clamped to the image.
fn sample_statistics(hsv: &HsvImage, x: u32, y: u32, side: u32) -> ([f64; 3], [f64; 3]) {
    let half = side.max(1) / 2;
    let x0 = x.saturating_sub(half);
    let y0 = y.saturating_sub(half);
    let x1 = (x + half).min(hsv.width() - 1);
    let y1 = (y + half).min(hsv.height() - 1);

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    let mut n = 0.0f64;
    for py in y0..=y1 {
        for px in x0..=x1 {
            let pixel = hsv.get_pixel(px, py).0;
            for c in 0..3 {
                let v = f64::from(pixel[c]);
                sum[c] += v;
                sum_sq[c] += v * v;
            }
            n += 1.0;
        }
    }

    let mean = sum.map(|s| s / n);
    let mut stddev = [0.0; 3];
    for c in 0..3 {
        stddev[c] = (sum_sq[c] / n - mean[c] * mean[c]).max(0.0).sqrt();
    }
    (mean, stddev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(hsv: [u8; 3]) -> HsvImage {
        HsvImage::from_pixel(40, 30, Rgb(hsv))
    }

    #[test]
    fn uniform_patch_centers_range_on_sample() {
        let mut table = ColorTable::starter();
        let report = calibrate(
            &mut table,
            "green",
            &uniform([100, 150, 150]),
            (20, 15),
            &CalibrationSettings::default(),
        )
        .unwrap();

        let green = table.get("green").unwrap();
        assert_eq!(green.primary, HsvRange::new([92, 110, 110], [108, 190, 190]));
        assert!(green.secondary.is_none());
        assert!(!report.wrapped);
        assert_eq!(report.stddev, [0.0; 3]);
    }

    #[test]
    fn pink_sampled_near_zero_splits_the_hue_range() {
        let mut table = ColorTable::starter();
        let report = calibrate(
            &mut table,
            "pink",
            &uniform([4, 200, 200]),
            (0, 0),
            &CalibrationSettings::default(),
        )
        .unwrap();

        assert!(report.wrapped);
        let pink = table.get("pink").unwrap();
        assert_eq!(pink.primary, HsvRange::new([0, 160, 160], [12, 240, 240]));
        assert_eq!(pink.secondary, Some(HsvRange::new([172, 160, 160], [180, 240, 240])));
    }

    #[test]
    fn pink_sampled_near_max_wraps_to_low_hues() {
        let mut table = ColorTable::starter();
        calibrate(
            &mut table,
            "pink",
            &uniform([176, 200, 200]),
            (39, 29),
            &CalibrationSettings::default(),
        )
        .unwrap();

        let pink = table.get("pink").unwrap();
        assert_eq!(pink.primary, HsvRange::new([168, 160, 160], [180, 240, 240]));
        assert_eq!(pink.secondary, Some(HsvRange::new([0, 160, 160], [8, 240, 240])));
    }

    #[test]
    fn recalibrating_away_from_the_wrap_clears_secondary() {
        let mut table = ColorTable::starter();
        let settings = CalibrationSettings::default();
        calibrate(&mut table, "pink", &uniform([4, 200, 200]), (5, 5), &settings).unwrap();
        calibrate(&mut table, "pink", &uniform([160, 200, 200]), (5, 5), &settings).unwrap();
        assert!(table.get("pink").unwrap().secondary.is_none());
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let mut table = ColorTable::starter();
        let before = table.clone();
        let err = calibrate(
            &mut table,
            "purple",
            &uniform([100, 150, 150]),
            (1, 1),
            &CalibrationSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CalibrationError::UnknownProfile(name) if name == "purple"));
        assert_eq!(table, before);
    }

    #[test]
    fn mixed_patch_reports_spread() {
        let mut hsv = uniform([60, 200, 200]);
        hsv.put_pixel(10, 10, Rgb([70, 200, 200]));
        let mut table = ColorTable::starter();
        let report = calibrate(&mut table, "green", &hsv, (10, 10), &CalibrationSettings::default()).unwrap();
        assert!(report.stddev[0] > 0.0);
        assert!((report.mean[0] - 60.4).abs() < 1e-9);
    }
}
