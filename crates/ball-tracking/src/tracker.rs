//! Whole-frame color ball tracking.

use depth_ingest::{FramePair, Intrinsics};
use tracing::trace;

use crate::{
    calibration::CalibrationSettings,
    cluster::{ClusterMerger, DEFAULT_MERGE_DISTANCE},
    detector::{Blob, ColorDetector, DEFAULT_MIN_CONTOUR_AREA},
    hsv::rgb_to_hsv,
    localizer::{DEFAULT_MAX_DEPTH_M, DEFAULT_PATCH_SIZE, Localizer},
    observation::{BallObservation, Point2},
    profile::ColorTable,
};

/// Turns one aligned color/depth pair into ball observations.
///
/// Implementations own whatever per-frame state they need; the engine calls
/// `detect` once per tick from a single thread.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frames: &FramePair, intrinsics: &Intrinsics) -> Vec<BallObservation>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerConfig {
    pub min_contour_area: f64,
    pub merge_distance_px: f32,
    pub max_depth_m: f32,
    pub depth_patch: u32,
    pub downscale: f64,
    pub calibration: CalibrationSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_contour_area: DEFAULT_MIN_CONTOUR_AREA,
            merge_distance_px: DEFAULT_MERGE_DISTANCE,
            max_depth_m: DEFAULT_MAX_DEPTH_M,
            depth_patch: DEFAULT_PATCH_SIZE,
            downscale: 1.0,
            calibration: CalibrationSettings::default(),
        }
    }
}

/// HSV color detector over every profile in a [`ColorTable`].
pub struct BallTracker {
    config: TrackerConfig,
    table: ColorTable,
    detector: ColorDetector,
    merger: ClusterMerger,
    localizer: Localizer,
}

impl BallTracker {
    pub fn new(table: ColorTable, config: TrackerConfig) -> Self {
        Self {
            detector: ColorDetector::new(config.min_contour_area),
            merger: ClusterMerger::new(config.merge_distance_px),
            localizer: Localizer::new(config.depth_patch, config.max_depth_m),
            config,
            table,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn table(&self) -> &ColorTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ColorTable {
        &mut self.table
    }

    fn observe_color(
        &self,
        label: &str,
        blobs: &[Blob],
        frames: &FramePair,
        intrinsics: &Intrinsics,
        out: &mut Vec<BallObservation>,
    ) {
        let centers: Vec<Point2> = blobs.iter().map(|b| b.center).collect();
        let mut index = 0;
        for cluster in self.merger.cluster(&centers) {
            let Some(located) = self
                .localizer
                .localize(&frames.depth, intrinsics, cluster.centroid)
            else {
                trace!(label, center = ?cluster.centroid, "dropping center without trusted depth");
                continue;
            };
            let area: f64 = cluster.members.iter().map(|&i| blobs[i].area).sum();
            out.push(BallObservation {
                id: format!("{label}_{index}"),
                label: label.to_string(),
                pixel: cluster.centroid,
                world: located.world,
                radius_px: (area / std::f64::consts::PI).sqrt() as f32,
                depth_m: located.depth_m,
                confidence: 1.0,
                held: false,
                timestamp_us: frames.timestamp_us,
            });
            index += 1;
        }
    }
}

impl ObjectDetector for BallTracker {
    fn detect(&mut self, frames: &FramePair, intrinsics: &Intrinsics) -> Vec<BallObservation> {
        let hsv = rgb_to_hsv(&frames.color);
        let mut observations = Vec::new();
        for profile in self.table.iter() {
            let blobs = self.detector.detect(&hsv, profile, self.config.downscale);
            if blobs.is_empty() {
                continue;
            }
            self.observe_color(&profile.name, &blobs, frames, intrinsics, &mut observations);
        }
        observations
    }
}
