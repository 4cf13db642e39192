//! Procedurally rendered camera used for demos, soak runs and tests.
//!
//! Renders colored discs orbiting the image center over a flat background, with
//! a depth map that is consistent with the pinhole intrinsics it reports.

use std::{
    f32::consts::TAU,
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use image::{Rgb, RgbImage};

use crate::{
    camera::DepthCamera,
    types::{CaptureError, DepthMap, FrameSet, Intrinsics, StreamMode},
};

const DEPTH_SCALE: f32 = 0.001;
const BACKGROUND_DEPTH_M: f32 = 4.5;
const BACKGROUND_RGB: [u8; 3] = [40, 40, 46];

/// One rendered ball.
#[derive(Clone, Debug)]
pub struct SyntheticBall {
    pub rgb: [u8; 3],
    /// Physical radius in meters.
    pub radius_m: f32,
    pub depth_m: f32,
    /// Orbit radius as a fraction of the image height.
    pub orbit: f32,
    /// Revolutions per second.
    pub speed: f32,
    pub phase: f32,
}

impl SyntheticBall {
    pub fn green() -> Self {
        Self {
            rgb: [0, 200, 0],
            radius_m: 0.035,
            depth_m: 1.2,
            orbit: 0.25,
            speed: 0.5,
            phase: 0.0,
        }
    }

    pub fn orange() -> Self {
        Self {
            rgb: [255, 90, 0],
            radius_m: 0.035,
            depth_m: 1.5,
            orbit: 0.3,
            speed: 0.35,
            phase: TAU / 2.0,
        }
    }
}

pub struct SyntheticCamera {
    balls: Vec<SyntheticBall>,
    supported: Option<Vec<StreamMode>>,
    mode: Option<StreamMode>,
    intrinsics: Option<Intrinsics>,
    frame_index: u64,
    pace: bool,
    drop_depth_every: Option<u64>,
    last_frame: Option<Instant>,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            balls: vec![SyntheticBall::green(), SyntheticBall::orange()],
            supported: None,
            mode: None,
            intrinsics: None,
            frame_index: 0,
            pace: false,
            drop_depth_every: None,
            last_frame: None,
        }
    }

    /// Restrict the modes the camera accepts; by default every mode is accepted.
    pub fn with_supported_modes(mut self, modes: Vec<StreamMode>) -> Self {
        self.supported = Some(modes);
        self
    }

    pub fn with_balls(mut self, balls: Vec<SyntheticBall>) -> Self {
        self.balls = balls;
        self
    }

    /// Sleep between frames so delivery matches the negotiated frame rate.
    pub fn paced(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    /// Omit the depth frame on every `n`th frame, as a flaky sensor would.
    pub fn drop_depth_every(mut self, n: u64) -> Self {
        self.drop_depth_every = (n > 0).then_some(n);
        self
    }

    fn render(&self, mode: &StreamMode, intrinsics: &Intrinsics) -> (RgbImage, DepthMap) {
        let mut color = RgbImage::from_pixel(mode.width, mode.height, Rgb(BACKGROUND_RGB));
        let background_raw = (BACKGROUND_DEPTH_M / DEPTH_SCALE) as u16;
        let mut depth = DepthMap::new(
            mode.width,
            mode.height,
            DEPTH_SCALE,
            vec![background_raw; mode.width as usize * mode.height as usize],
        )
        .unwrap_or_else(|_| DepthMap::empty(mode.width, mode.height, DEPTH_SCALE));

        let t = self.frame_index as f32 / mode.fps.max(1) as f32;
        for ball in &self.balls {
            let angle = ball.phase + t * ball.speed * TAU;
            let orbit_px = ball.orbit * mode.height as f32;
            let cx = intrinsics.ppx + orbit_px * angle.cos();
            let cy = intrinsics.ppy + orbit_px * angle.sin();
            let radius = (ball.radius_m * intrinsics.fx / ball.depth_m).max(1.0);
            let raw = (ball.depth_m / DEPTH_SCALE) as u16;

            let min_x = (cx - radius).floor().max(0.0) as u32;
            let max_x = ((cx + radius).ceil() as u32).min(mode.width.saturating_sub(1));
            let min_y = (cy - radius).floor().max(0.0) as u32;
            let max_y = ((cy + radius).ceil() as u32).min(mode.height.saturating_sub(1));
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let dx = x as f32 - cx;
                    let dy = y as f32 - cy;
                    if dx * dx + dy * dy <= radius * radius {
                        color.put_pixel(x, y, Rgb(ball.rgb));
                        depth.set_raw(x, y, raw);
                    }
                }
            }
        }
        (color, depth)
    }
}

impl DepthCamera for SyntheticCamera {
    fn describe(&self) -> String {
        format!("synthetic camera ({} ball(s))", self.balls.len())
    }

    fn try_start(&mut self, mode: &StreamMode) -> Result<Intrinsics, CaptureError> {
        if let Some(supported) = &self.supported {
            if !supported.contains(mode) {
                return Err(CaptureError::ModeRejected {
                    mode: *mode,
                    reason: "not in the supported mode list".into(),
                });
            }
        }
        let intrinsics = Intrinsics::pinhole(
            mode.width,
            mode.height,
            mode.width as f32 * 0.95,
            DEPTH_SCALE,
        );
        self.mode = Some(*mode);
        self.intrinsics = Some(intrinsics);
        self.frame_index = 0;
        Ok(intrinsics)
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameSet, CaptureError> {
        let (Some(mode), Some(intrinsics)) = (self.mode, self.intrinsics) else {
            return Err(CaptureError::NotStarted);
        };

        if self.pace {
            if let Some(last) = self.last_frame {
                let due = mode.frame_interval().saturating_sub(last.elapsed());
                if due > timeout {
                    thread::sleep(timeout);
                    return Err(CaptureError::Timeout(timeout));
                }
                thread::sleep(due);
            }
            self.last_frame = Some(Instant::now());
        }

        let (color, depth) = self.render(&mode, &intrinsics);
        self.frame_index += 1;
        let drop_depth = self
            .drop_depth_every
            .is_some_and(|n| self.frame_index % n == 0);

        Ok(FrameSet {
            color: Some(color),
            depth: (!drop_depth).then_some(depth),
            timestamp_us: Utc::now().timestamp_micros(),
        })
    }

    fn stop(&mut self) {
        self.mode = None;
        self.intrinsics = None;
        self.last_frame = None;
    }
}
