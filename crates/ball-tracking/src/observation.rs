use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Camera-space point in meters (x right, y down, z forward).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One detected ball on one tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BallObservation {
    pub id: String,
    pub label: String,
    pub pixel: Point2,
    pub world: Point3,
    pub radius_px: f32,
    pub depth_m: f32,
    pub confidence: f32,
    pub held: bool,
    pub timestamp_us: i64,
}
