//! Pluggable behavior modules driven by the tick loop.
//!
//! At most one behavior module is active at a time (see `host`). Modules read
//! each published snapshot and actuate only by emitting [`Command`]s, which
//! the router delivers to the actuator off the tick thread.

use std::str::FromStr;

use thiserror::Error;

use crate::engine::{
    data::FrameSnapshot,
    protocol::{Command, ModuleArgs},
};

mod height_to_brightness;
mod position_to_rgb;

pub(crate) use height_to_brightness::HeightToBrightness;
pub(crate) use position_to_rgb::PositionToRgb;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ConfigError {
    #[error("unknown module {0:?}")]
    UnknownModule(String),
    #[error("missing required setting {0:?}")]
    MissingKey(&'static str),
    #[error("invalid value {value:?} for {key:?}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("unknown setting {0:?}")]
    UnknownKey(String),
}

pub(crate) trait BehaviorModule: Send {
    /// Canonical (snake_case) module name.
    fn name(&self) -> &'static str;

    fn setup(&mut self) {}

    fn update(&mut self, snapshot: &FrameSnapshot, emit: &mut dyn FnMut(Command));

    fn cleanup(&mut self) {}

    /// Apply wire settings. On error the module keeps its previous settings.
    fn configure(&mut self, args: &ModuleArgs) -> Result<(), ConfigError>;
}

/// Builds a module instance from a wire name.
pub(crate) type ModuleFactory =
    dyn Fn(&str) -> Result<Box<dyn BehaviorModule>, ConfigError> + Send + Sync;

/// Canonical name of a built-in module, accepting class-style aliases.
pub(crate) fn canonical_name(name: &str) -> Option<&'static str> {
    match name {
        "position_to_rgb" | "PositionToRgbModule" => Some("position_to_rgb"),
        "height_to_brightness" | "HeightToBrightnessModule" => Some("height_to_brightness"),
        _ => None,
    }
}

/// Factory for the built-in modules. Class-style names are accepted as aliases.
pub(crate) fn create_module(name: &str) -> Result<Box<dyn BehaviorModule>, ConfigError> {
    match canonical_name(name) {
        Some("position_to_rgb") => Ok(Box::new(PositionToRgb::default())),
        Some("height_to_brightness") => Ok(Box::new(HeightToBrightness::default())),
        _ => Err(ConfigError::UnknownModule(name.to_string())),
    }
}

/// Key-by-key reader over [`ModuleArgs`] that rejects keys nobody consumed.
pub(crate) struct ArgReader<'a> {
    args: &'a ModuleArgs,
    consumed: Vec<&'a str>,
}

impl<'a> ArgReader<'a> {
    pub(crate) fn new(args: &'a ModuleArgs) -> Self {
        Self {
            args,
            consumed: Vec::with_capacity(args.len()),
        }
    }

    pub(crate) fn optional<T>(&mut self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some((stored_key, raw)) = self.args.get_key_value(key) else {
            return Ok(None);
        };
        self.consumed.push(stored_key.as_str());
        raw.trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: err.to_string(),
            })
    }

    pub(crate) fn required<T>(&mut self, key: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)?.ok_or(ConfigError::MissingKey(key))
    }

    /// Fails on the first key that was never read.
    pub(crate) fn finish(self) -> Result<(), ConfigError> {
        match self.args.keys().find(|k| !self.consumed.contains(&k.as_str())) {
            Some(unknown) => Err(ConfigError::UnknownKey(unknown.clone())),
            None => Ok(()),
        }
    }
}

/// Checks that `[low, high]` is a usable mapping interval.
pub(crate) fn check_interval(key: &str, low: f32, high: f32) -> Result<(), ConfigError> {
    if low.is_finite() && high.is_finite() && low < high {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        key: key.to_string(),
        value: format!("[{low}, {high}]"),
        reason: "lower bound must be below upper bound".into(),
    })
}

/// Linear map of `value` from `[low, high]` to `[0, 1]`, clamped.
pub(crate) fn normalize(value: f32, low: f32, high: f32) -> f32 {
    ((value - low) / (high - low)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> ModuleArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn aliases_resolve_to_the_name_modules_report() {
        for alias in ["PositionToRgbModule", "HeightToBrightnessModule"] {
            let canonical = canonical_name(alias).unwrap();
            assert_eq!(canonical_name(canonical), Some(canonical));
            assert_eq!(create_module(alias).unwrap().name(), canonical);
        }
        assert_eq!(canonical_name("position_to_rgb_module"), None);
    }

    #[test]
    fn factory_accepts_aliases_and_rejects_unknown() {
        assert_eq!(create_module("position_to_rgb").unwrap().name(), "position_to_rgb");
        assert_eq!(create_module("PositionToRgbModule").unwrap().name(), "position_to_rgb");
        assert_eq!(
            create_module("height_to_brightness").unwrap().name(),
            "height_to_brightness"
        );
        assert_eq!(
            create_module("fireworks").err(),
            Some(ConfigError::UnknownModule("fireworks".into()))
        );
    }

    #[test]
    fn reader_reports_each_failure_kind() {
        let raw = args(&[("count", "x"), ("extra", "1")]);
        let mut reader = ArgReader::new(&raw);
        assert!(matches!(
            reader.required::<u32>("count"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(
            reader.required::<u32>("missing"),
            Err(ConfigError::MissingKey("missing"))
        );
        assert_eq!(reader.finish(), Err(ConfigError::UnknownKey("extra".into())));
    }

    #[test]
    fn normalize_clamps() {
        assert_eq!(normalize(-1.0, -0.5, 0.5), 0.0);
        assert_eq!(normalize(0.0, -0.5, 0.5), 0.5);
        assert_eq!(normalize(2.0, -0.5, 0.5), 1.0);
        assert!(check_interval("range", 1.0, 1.0).is_err());
    }
}
