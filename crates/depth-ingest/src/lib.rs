//! Color+depth frame acquisition.
//!
//! Cameras implement [`DepthCamera`]; the engine owns a [`FrameSource`] that
//! negotiated a [`StreamMode`] from a priority list at startup.

pub mod camera;
pub mod recording;
pub mod synthetic;
pub mod types;

pub use camera::{ActiveStream, DEFAULT_MODE_CANDIDATES, DepthCamera, FrameSource, negotiate_mode};
pub use recording::RecordingCamera;
pub use synthetic::{SyntheticBall, SyntheticCamera};
pub use types::{
    CaptureError, DepthMap, DistortionModel, FramePair, FrameSet, Intrinsics, StreamMode,
};
