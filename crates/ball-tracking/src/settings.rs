//! JSON persistence of the color table.
//!
//! The file is a flat object keyed by profile name:
//!
//! ```json
//! { "pink": { "min_hsv": [150, 150, 90], "max_hsv": [170, 255, 255],
//!             "min_hsv2": [172, 150, 90], "max_hsv2": [180, 255, 255] } }
//! ```
//!
//! Channel values are read as numbers (integers or floats). Hue is limited to
//! `0..=180`; saturation and value to `0..=255`. A secondary range
//! is enabled only when both `min_hsv2` and `max_hsv2` are present and
//! non-negative.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    hsv::{HUE_MAX, HsvRange},
    profile::{ColorProfile, ColorTable},
};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file {path} not readable: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("settings file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("profile {name:?}: {reason}")]
    InvalidProfile { name: String, reason: String },
    #[error("failed to write settings to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProfile {
    min_hsv: [f64; 3],
    max_hsv: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_hsv2: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_hsv2: Option<[f64; 3]>,
}

impl StoredProfile {
    fn from_profile(profile: &ColorProfile) -> Self {
        let widen = |v: [u8; 3]| v.map(f64::from);
        Self {
            min_hsv: widen(profile.primary.min),
            max_hsv: widen(profile.primary.max),
            min_hsv2: profile.secondary.map(|r| widen(r.min)),
            max_hsv2: profile.secondary.map(|r| widen(r.max)),
        }
    }

    fn apply_to(&self, profile: &mut ColorProfile) -> Result<(), SettingsError> {
        let invalid = |reason: String| SettingsError::InvalidProfile {
            name: profile.name.clone(),
            reason,
        };
        let primary = HsvRange::new(
            channel_triplet(self.min_hsv).map_err(invalid)?,
            channel_triplet(self.max_hsv).map_err(invalid)?,
        );
        let secondary = match (self.min_hsv2, self.max_hsv2) {
            (Some(min), Some(max)) if min[0] >= 0.0 && max[0] >= 0.0 => Some(HsvRange::new(
                channel_triplet(min).map_err(invalid)?,
                channel_triplet(max).map_err(invalid)?,
            )),
            _ => None,
        };
        profile.primary = primary;
        profile.secondary = secondary;
        Ok(())
    }
}

fn channel_triplet(values: [f64; 3]) -> Result<[u8; 3], String> {
    let mut out = [0u8; 3];
    for (slot, value) in out.iter_mut().zip(values) {
        if !(0.0..=255.0).contains(&value) {
            return Err(format!("channel value {value} outside 0..=255"));
        }
        *slot = value.round() as u8;
    }
    if out[0] > HUE_MAX {
        return Err(format!("hue {} above {HUE_MAX}", out[0]));
    }
    Ok(out)
}

/// Location of the persisted color table.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the table, falling back to defaults on any problem.
    ///
    /// Profiles whose stored entry is malformed keep their default ranges;
    /// a missing or unparsable file yields the starter table.
    pub fn load(&self) -> ColorTable {
        match self.try_load() {
            Ok(table) => {
                info!("color settings loaded from {}", self.path.display());
                table
            }
            Err(SettingsError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "settings file {} not found; using default colors",
                    self.path.display()
                );
                ColorTable::starter()
            }
            Err(err) => {
                warn!("{err}; using default colors");
                ColorTable::starter()
            }
        }
    }

    /// Strict load: file-level problems are errors, entry-level problems are
    /// logged and leave that profile at its default.
    pub fn try_load(&self) -> Result<ColorTable, SettingsError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| SettingsError::Read {
            path: self.path.clone(),
            source,
        })?;
        let entries: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let mut table = ColorTable::starter();
        for (name, value) in entries {
            let stored: StoredProfile = match serde_json::from_value(value) {
                Ok(stored) => stored,
                Err(err) => {
                    warn!("ignoring stored profile {name:?}: {err}");
                    continue;
                }
            };
            let mut profile = ColorTable::starter_profile(&name).unwrap_or_else(|| {
                ColorProfile::new(name.clone(), HsvRange::new([0, 0, 0], [0, 0, 0]))
            });
            match stored.apply_to(&mut profile) {
                Ok(()) => table.upsert(profile),
                Err(err) => warn!("ignoring stored profile: {err}"),
            }
        }
        Ok(table)
    }

    /// Write the whole table, replacing the file atomically.
    pub fn save(&self, table: &ColorTable) -> Result<(), SettingsError> {
        let write_err = |source: io::Error| SettingsError::Write {
            path: self.path.clone(),
            source,
        };
        let stored: BTreeMap<&str, StoredProfile> = table
            .iter()
            .map(|profile| (profile.name.as_str(), StoredProfile::from_profile(profile)))
            .collect();
        let body = serde_json::to_vec_pretty(&stored).map_err(|err| write_err(err.into()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|err| write_err(err.error))?;

        info!("color settings saved to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("ball_settings.json"));

        let mut table = ColorTable::starter();
        let pink = table.get_mut("pink").unwrap();
        pink.primary = HsvRange::new([0, 110, 120], [12, 200, 255]);
        pink.secondary = Some(HsvRange::new([172, 110, 120], [180, 200, 255]));
        table.get_mut("green").unwrap().primary = HsvRange::new([52, 100, 90], [68, 230, 250]);

        store.save(&table).unwrap();
        let loaded = store.try_load().unwrap();
        assert_eq!(loaded, table);
        assert!(loaded.get("green").unwrap().secondary.is_none());
        assert!(loaded.get("pink").unwrap().hue_wrap.is_some());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.try_load(), Err(SettingsError::Read { .. })));
        assert_eq!(store.load(), ColorTable::starter());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ball_settings.json");
        fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(path);
        assert!(matches!(store.try_load(), Err(SettingsError::Parse { .. })));
        assert_eq!(store.load(), ColorTable::starter());
    }

    #[test]
    fn malformed_entry_keeps_that_profile_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ball_settings.json");
        fs::write(
            &path,
            r#"{
                "green": { "min_hsv": [50.0, 100.0, 100.0], "max_hsv": [70.0, 255.0, 255.0] },
                "yellow": { "min_hsv": [300, 0, 0], "max_hsv": [35, 255, 255] },
                "orange": { "max_hsv": [1, 2, 3] },
                "blue": { "min_hsv": [100, 120, 70], "max_hsv": [130, 255, 255],
                          "min_hsv2": [-1, -1, -1], "max_hsv2": [-1, -1, -1] }
            }"#,
        )
        .unwrap();
        let table = SettingsStore::new(path).try_load().unwrap();
        let starter = ColorTable::starter();

        assert_eq!(table.get("green").unwrap().primary.min, [50, 100, 100]);
        assert_eq!(table.get("yellow"), starter.get("yellow"));
        assert_eq!(table.get("orange"), starter.get("orange"));
        let blue = table.get("blue").unwrap();
        assert!(blue.secondary.is_none());
        assert!(blue.hue_wrap.is_none());
    }

    #[test]
    fn hue_beyond_half_degrees_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ball_settings.json");
        fs::write(
            &path,
            r#"{
                "green": { "min_hsv": [200, 100, 100], "max_hsv": [220, 255, 255] },
                "pink": { "min_hsv": [0, 110, 120], "max_hsv": [12, 200, 255],
                          "min_hsv2": [172, 110, 120], "max_hsv2": [181, 200, 255] },
                "blue": { "min_hsv": [100, 120, 70], "max_hsv": [180, 255, 255] }
            }"#,
        )
        .unwrap();
        let table = SettingsStore::new(path).try_load().unwrap();
        let starter = ColorTable::starter();

        assert_eq!(table.get("green"), starter.get("green"));
        assert_eq!(table.get("pink"), starter.get("pink"));
        assert_eq!(table.get("blue").unwrap().primary.max, [180, 255, 255]);
    }
}
