//! Versioned telemetry record published once per tick.

#[cfg(test)]
use bincode::error::DecodeError;
use bincode::{config, error::EncodeError};
use serde::{Deserialize, Serialize};

use crate::engine::data::FrameSnapshot;

pub(crate) const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct IntrinsicsRecord {
    pub(crate) fx: f32,
    pub(crate) fy: f32,
    pub(crate) ppx: f32,
    pub(crate) ppy: f32,
    pub(crate) depth_scale: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct ObjectRecord {
    pub(crate) id: String,
    pub(crate) label: String,
    pub(crate) pixel: [f32; 2],
    pub(crate) world: [f32; 3],
    pub(crate) radius_px: f32,
    pub(crate) depth_m: f32,
    pub(crate) confidence: f32,
    pub(crate) held: bool,
    pub(crate) timestamp_us: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct StatusRecord {
    pub(crate) camera_connected: bool,
    pub(crate) running: bool,
    pub(crate) fps: f32,
    pub(crate) frame_count: u64,
    pub(crate) mode: String,
    pub(crate) timestamp_us: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct TelemetryFrame {
    pub(crate) schema_version: u32,
    pub(crate) frame_number: u64,
    pub(crate) timestamp_us: i64,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) intrinsics: IntrinsicsRecord,
    pub(crate) objects: Vec<ObjectRecord>,
    pub(crate) status: StatusRecord,
}

impl From<&FrameSnapshot> for TelemetryFrame {
    fn from(snapshot: &FrameSnapshot) -> Self {
        let k = &snapshot.intrinsics;
        Self {
            schema_version: SCHEMA_VERSION,
            frame_number: snapshot.frame_number,
            timestamp_us: snapshot.timestamp_us,
            width: snapshot.width,
            height: snapshot.height,
            intrinsics: IntrinsicsRecord {
                fx: k.fx,
                fy: k.fy,
                ppx: k.ppx,
                ppy: k.ppy,
                depth_scale: k.depth_scale,
            },
            objects: snapshot
                .observations
                .iter()
                .map(|o| ObjectRecord {
                    id: o.id.clone(),
                    label: o.label.clone(),
                    pixel: [o.pixel.x, o.pixel.y],
                    world: [o.world.x, o.world.y, o.world.z],
                    radius_px: o.radius_px,
                    depth_m: o.depth_m,
                    confidence: o.confidence,
                    held: o.held,
                    timestamp_us: o.timestamp_us,
                })
                .collect(),
            status: StatusRecord {
                camera_connected: snapshot.status.camera_connected,
                running: snapshot.status.running,
                fps: snapshot.status.fps,
                frame_count: snapshot.status.frame_count,
                mode: snapshot.status.mode.clone(),
                timestamp_us: snapshot.timestamp_us,
            },
        }
    }
}

impl TelemetryFrame {
    pub(crate) fn to_bincode(&self) -> Result<Vec<u8>, EncodeError> {
        bincode::serde::encode_to_vec(self, config::standard())
    }

    #[cfg(test)]
    pub(crate) fn from_bincode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, config::standard())?;
        Ok(frame)
    }
}

/// Length-delimited framing used on `/telemetry.bin`: u32 big-endian length,
/// then the payload.
pub(crate) fn length_prefixed(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}
