//! Camera abstraction and startup mode negotiation.

use std::time::Duration;

use tracing::{info, warn};

use crate::types::{CaptureError, FrameSet, Intrinsics, StreamMode};

/// Modes tried in order when the caller does not supply its own list.
pub const DEFAULT_MODE_CANDIDATES: [StreamMode; 4] = [
    StreamMode::new(848, 480, 60),
    StreamMode::new(640, 480, 60),
    StreamMode::new(640, 480, 30),
    StreamMode::new(424, 240, 30),
];

/// A color+depth camera whose depth stream is aligned to the color stream.
///
/// Vendor SDK bindings implement this trait; the engine only ever talks to it
/// through [`FrameSource`].
pub trait DepthCamera: Send {
    /// Human readable name used in logs.
    fn describe(&self) -> String;

    /// Start both streams at `mode`, returning the color stream intrinsics.
    fn try_start(&mut self, mode: &StreamMode) -> Result<Intrinsics, CaptureError>;

    /// Block for at most `timeout` waiting for the next frame set.
    fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameSet, CaptureError>;

    fn stop(&mut self);
}

/// Result of a successful negotiation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActiveStream {
    pub mode: StreamMode,
    pub intrinsics: Intrinsics,
}

/// Try each candidate once, in order, and keep the first the camera accepts.
pub fn negotiate_mode(
    camera: &mut dyn DepthCamera,
    candidates: &[StreamMode],
) -> Result<ActiveStream, CaptureError> {
    for mode in candidates {
        match camera.try_start(mode) {
            Ok(intrinsics) => {
                info!("{}: streaming at {mode}", camera.describe());
                return Ok(ActiveStream {
                    mode: *mode,
                    intrinsics,
                });
            }
            Err(err) => {
                warn!("{}: mode {mode} unavailable: {err}", camera.describe());
            }
        }
    }
    Err(CaptureError::NoUsableMode {
        tried: candidates.len(),
    })
}

/// A started camera plus the mode it negotiated.
pub struct FrameSource {
    camera: Box<dyn DepthCamera>,
    active: ActiveStream,
}

impl FrameSource {
    /// Negotiate a mode on `camera`; fails only when every candidate is rejected.
    pub fn open(
        mut camera: Box<dyn DepthCamera>,
        candidates: &[StreamMode],
    ) -> Result<Self, CaptureError> {
        let active = negotiate_mode(camera.as_mut(), candidates)?;
        Ok(Self { camera, active })
    }

    pub fn mode(&self) -> StreamMode {
        self.active.mode
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.active.intrinsics
    }

    /// Wait for the next frame set with a bounded timeout.
    pub fn next_frames(&mut self, timeout: Duration) -> Result<FrameSet, CaptureError> {
        self.camera.wait_for_frames(timeout)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.camera.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticCamera;

    #[test]
    fn falls_back_to_first_supported_mode() {
        let mut camera = SyntheticCamera::new().with_supported_modes(vec![StreamMode::new(640, 480, 30)]);
        let active = negotiate_mode(&mut camera, &DEFAULT_MODE_CANDIDATES).unwrap();
        assert_eq!(active.mode, StreamMode::new(640, 480, 30));
        assert_eq!(active.intrinsics.width, 640);
    }

    #[test]
    fn exhausting_candidates_is_an_error() {
        let mut camera = SyntheticCamera::new().with_supported_modes(vec![StreamMode::new(1920, 1080, 30)]);
        let err = negotiate_mode(&mut camera, &DEFAULT_MODE_CANDIDATES).unwrap_err();
        assert!(matches!(err, CaptureError::NoUsableMode { tried: 4 }));
    }

    #[test]
    fn frame_source_reports_negotiated_mode() {
        let camera = SyntheticCamera::new();
        let mut source = FrameSource::open(Box::new(camera), &DEFAULT_MODE_CANDIDATES).unwrap();
        assert_eq!(source.mode(), DEFAULT_MODE_CANDIDATES[0]);
        let frames = source.next_frames(Duration::from_millis(100)).unwrap();
        let pair = frames.into_pair().unwrap();
        assert_eq!(pair.color.width(), 848);
        assert_eq!(pair.depth.height(), 480);
    }
}
