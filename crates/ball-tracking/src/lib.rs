//! Colored ball detection and 3D localization.
//!
//! [`BallTracker`] runs the per-color pipeline (HSV mask, morphology, contour
//! centroids, proximity merge, depth deprojection) for every profile in a
//! [`ColorTable`] and implements [`ObjectDetector`], the seam the engine
//! consumes.

pub mod calibration;
pub mod cluster;
pub mod detector;
pub mod hsv;
pub mod localizer;
pub mod observation;
pub mod profile;
pub mod settings;
pub mod tracker;

pub use calibration::{CalibrationError, CalibrationReport, CalibrationSettings, calibrate};
pub use cluster::{Cluster, ClusterMerger};
pub use detector::{Blob, ColorDetector};
pub use hsv::{HsvImage, HsvRange, rgb_to_hsv};
pub use localizer::{Located, Localizer, deproject};
pub use observation::{BallObservation, Point2, Point3};
pub use profile::{ColorProfile, ColorTable, HueWrap};
pub use settings::{SettingsError, SettingsStore};
pub use tracker::{BallTracker, ObjectDetector, TrackerConfig};
