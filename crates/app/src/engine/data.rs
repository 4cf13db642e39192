use std::sync::Arc;

use ball_tracking::BallObservation;
use depth_ingest::Intrinsics;

/// Engine health as of one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct SystemStatus {
    pub(crate) running: bool,
    pub(crate) camera_connected: bool,
    pub(crate) fps: f32,
    pub(crate) frame_count: u64,
    pub(crate) mode: String,
}

/// Everything the engine knows about one processed frame.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FrameSnapshot {
    pub(crate) frame_number: u64,
    pub(crate) timestamp_us: i64,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) intrinsics: Intrinsics,
    pub(crate) observations: Vec<BallObservation>,
    pub(crate) status: SystemStatus,
}

impl FrameSnapshot {
    /// First observation carrying `label`, in detection order.
    pub(crate) fn first_with_label(&self, label: &str) -> Option<&BallObservation> {
        self.observations.iter().find(|o| o.label == label)
    }
}

pub(crate) type SharedSnapshot = Arc<FrameSnapshot>;
