//! Replays a recorded session from disk.
//!
//! Layout of a recording directory:
//! - `intrinsics.json`: serialized [`Intrinsics`] of the color stream.
//! - `color_NNNNNN.png`: 8-bit RGB frames.
//! - `depth_NNNNNN.png`: 16-bit grayscale depth aligned to color, raw units.
//!
//! Frames are looped. A color frame without a matching depth file yields a
//! [`FrameSet`] without depth, which the engine skips.

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use tracing::debug;

use crate::{
    camera::DepthCamera,
    types::{CaptureError, DepthMap, FrameSet, Intrinsics, StreamMode},
};

pub struct RecordingCamera {
    root: PathBuf,
    intrinsics: Intrinsics,
    frames: Vec<u32>,
    cursor: usize,
    mode: Option<StreamMode>,
    last_frame: Option<Instant>,
}

impl RecordingCamera {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let root = root.as_ref().to_path_buf();
        let raw = fs::read_to_string(root.join("intrinsics.json"))?;
        let intrinsics: Intrinsics = serde_json::from_str(&raw)
            .map_err(|err| CaptureError::Malformed(format!("intrinsics.json: {err}")))?;

        let mut frames = Vec::new();
        for entry in fs::read_dir(&root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = name
                .strip_prefix("color_")
                .and_then(|rest| rest.strip_suffix(".png"))
                .and_then(|digits| digits.parse::<u32>().ok())
            {
                frames.push(index);
            }
        }
        frames.sort_unstable();
        if frames.is_empty() {
            return Err(CaptureError::Malformed(format!(
                "no color_*.png frames in {}",
                root.display()
            )));
        }
        debug!("recording {} holds {} frame(s)", root.display(), frames.len());

        Ok(Self {
            root,
            intrinsics,
            frames,
            cursor: 0,
            mode: None,
            last_frame: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn load(&self, index: u32) -> Result<FrameSet, CaptureError> {
        let color = image::open(self.root.join(format!("color_{index:06}.png")))?.to_rgb8();
        let depth_path = self.root.join(format!("depth_{index:06}.png"));
        let depth = if depth_path.exists() {
            let luma = image::open(&depth_path)?.into_luma16();
            let (width, height) = luma.dimensions();
            Some(DepthMap::new(
                width,
                height,
                self.intrinsics.depth_scale,
                luma.into_raw(),
            )?)
        } else {
            None
        };
        Ok(FrameSet {
            color: Some(color),
            depth,
            timestamp_us: Utc::now().timestamp_micros(),
        })
    }
}

impl DepthCamera for RecordingCamera {
    fn describe(&self) -> String {
        format!("recording {}", self.root.display())
    }

    fn try_start(&mut self, mode: &StreamMode) -> Result<Intrinsics, CaptureError> {
        if mode.width != self.intrinsics.width || mode.height != self.intrinsics.height {
            return Err(CaptureError::ModeRejected {
                mode: *mode,
                reason: format!(
                    "recorded at {}x{}",
                    self.intrinsics.width, self.intrinsics.height
                ),
            });
        }
        self.mode = Some(*mode);
        self.cursor = 0;
        Ok(self.intrinsics)
    }

    fn wait_for_frames(&mut self, timeout: Duration) -> Result<FrameSet, CaptureError> {
        let Some(mode) = self.mode else {
            return Err(CaptureError::NotStarted);
        };
        if let Some(last) = self.last_frame {
            let due = mode.frame_interval().saturating_sub(last.elapsed());
            if due > timeout {
                thread::sleep(timeout);
                return Err(CaptureError::Timeout(timeout));
            }
            thread::sleep(due);
        }
        self.last_frame = Some(Instant::now());

        let index = self.frames[self.cursor];
        self.cursor = (self.cursor + 1) % self.frames.len();
        self.load(index)
    }

    fn stop(&mut self) {
        self.mode = None;
        self.last_frame = None;
    }
}
