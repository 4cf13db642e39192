use std::{fmt, str::FromStr, time::Duration};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resolution and frame rate requested from the camera for both streams.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMode {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamMode {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Nominal interval between frames at this mode's frame rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

impl FromStr for StreamMode {
    type Err = String;

    /// Parses the `WIDTHxHEIGHT@FPS` form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (size, fps) = s
            .split_once('@')
            .ok_or_else(|| format!("expected WIDTHxHEIGHT@FPS, got {s:?}"))?;
        let (width, height) = size
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT@FPS, got {s:?}"))?;
        let parse = |value: &str, what: &str| {
            value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| format!("{what} must be a positive integer in {s:?}"))
        };
        Ok(Self {
            width: parse(width, "width")?,
            height: parse(height, "height")?,
            fps: parse(fps, "fps")?,
        })
    }
}

/// Lens distortion model reported alongside the color stream intrinsics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    #[default]
    None,
    InverseBrownConrady,
}

/// Pinhole intrinsics of the (depth-aligned) color stream.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    pub fx: f32,
    pub fy: f32,
    pub ppx: f32,
    pub ppy: f32,
    /// Meters per raw depth unit.
    pub depth_scale: f32,
    #[serde(default)]
    pub model: DistortionModel,
    #[serde(default)]
    pub coeffs: [f32; 5],
}

impl Intrinsics {
    /// Intrinsics for an ideal pinhole camera with the principal point at the image center.
    pub fn pinhole(width: u32, height: u32, focal: f32, depth_scale: f32) -> Self {
        Self {
            width,
            height,
            fx: focal,
            fy: focal,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            depth_scale,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }
}

/// Depth image aligned to the color image, stored as raw sensor units.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthMap {
    width: u32,
    height: u32,
    scale: f32,
    data: Vec<u16>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32, scale: f32, data: Vec<u16>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(CaptureError::Malformed(format!(
                "depth buffer holds {} samples, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            scale,
            data,
        })
    }

    /// A depth map with every sample set to zero (no depth).
    pub fn empty(width: u32, height: u32, scale: f32) -> Self {
        Self {
            width,
            height,
            scale,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn raw(&self, x: u32, y: u32) -> u16 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set_raw(&mut self, x: u32, y: u32, value: u16) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Distance in meters at `(x, y)`; zero means no valid sample.
    pub fn distance(&self, x: u32, y: u32) -> f32 {
        f32::from(self.raw(x, y)) * self.scale
    }
}

/// Frames delivered by the camera for one tick. Either stream may be absent.
#[derive(Debug, Default)]
pub struct FrameSet {
    pub color: Option<RgbImage>,
    pub depth: Option<DepthMap>,
    pub timestamp_us: i64,
}

/// A synchronized color+depth pair, the unit of work for one tick.
#[derive(Debug)]
pub struct FramePair {
    pub color: RgbImage,
    pub depth: DepthMap,
    pub timestamp_us: i64,
}

impl FrameSet {
    /// Returns the pair only when both streams delivered a frame.
    pub fn into_pair(self) -> Option<FramePair> {
        match (self.color, self.depth) {
            (Some(color), Some(depth)) => Some(FramePair {
                color,
                depth,
                timestamp_us: self.timestamp_us,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera rejected mode {mode}: {reason}")]
    ModeRejected { mode: StreamMode, reason: String },
    #[error("no usable camera mode among {tried} candidate(s)")]
    NoUsableMode { tried: usize },
    #[error("camera is not streaming")]
    NotStarted,
    #[error("timed out after {0:?} waiting for frames")]
    Timeout(Duration),
    #[error("camera disconnected: {0}")]
    Disconnected(String),
    #[error("malformed frame data: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}
