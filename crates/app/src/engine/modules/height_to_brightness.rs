use tracing::{debug, info};

use super::{ArgReader, BehaviorModule, ConfigError, check_interval, normalize};
use crate::engine::{
    data::FrameSnapshot,
    protocol::{Command, MAX_BRIGHTNESS, ModuleArgs, Target},
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct HeightToBrightnessSettings {
    pub(crate) target: Target,
    pub(crate) tracked_label: String,
    /// Height (meters above the optical axis) mapped to level 0.
    pub(crate) floor: f32,
    /// Height mapped to the top level.
    pub(crate) ceiling: f32,
}

impl Default for HeightToBrightnessSettings {
    fn default() -> Self {
        Self {
            target: Target::Object(201),
            tracked_label: "green".into(),
            floor: -0.5,
            ceiling: 0.5,
        }
    }
}

impl HeightToBrightnessSettings {
    fn parse(args: &ModuleArgs, current: &Self) -> Result<Self, ConfigError> {
        let mut reader = ArgReader::new(args);
        let target = reader.required::<Target>("target_ball_id")?;
        let tracked_label = reader
            .optional::<String>("tracked_label")?
            .unwrap_or_else(|| current.tracked_label.clone());
        let floor = reader.optional("floor")?.unwrap_or(current.floor);
        let ceiling = reader.optional("ceiling")?.unwrap_or(current.ceiling);
        reader.finish()?;
        check_interval("floor/ceiling", floor, ceiling)?;
        Ok(Self {
            target,
            tracked_label,
            floor,
            ceiling,
        })
    }
}

/// Dims or brightens a ball with the tracked ball's height.
///
/// Camera y points down, so height is `-world.y`. A command goes out only
/// when the quantized level changes.
#[derive(Debug, Default)]
pub(crate) struct HeightToBrightness {
    settings: HeightToBrightnessSettings,
    last_level: Option<u8>,
}

impl HeightToBrightness {
    fn level_for(&self, height: f32) -> u8 {
        let unit = normalize(height, self.settings.floor, self.settings.ceiling);
        (unit * f32::from(MAX_BRIGHTNESS)).round() as u8
    }
}

impl BehaviorModule for HeightToBrightness {
    fn name(&self) -> &'static str {
        "height_to_brightness"
    }

    fn setup(&mut self) {
        self.last_level = None;
        info!(target_ball = %self.settings.target, "height_to_brightness ready");
    }

    fn update(&mut self, snapshot: &FrameSnapshot, emit: &mut dyn FnMut(Command)) {
        let Some(ball) = snapshot.first_with_label(&self.settings.tracked_label) else {
            return;
        };
        let level = self.level_for(-ball.world.y);
        if self.last_level == Some(level) {
            return;
        }
        debug!(level, "brightness level changed");
        self.last_level = Some(level);
        emit(Command::SetBrightness {
            target: self.settings.target,
            level,
        });
    }

    fn cleanup(&mut self) {
        self.last_level = None;
    }

    fn configure(&mut self, args: &ModuleArgs) -> Result<(), ConfigError> {
        self.settings = HeightToBrightnessSettings::parse(args, &self.settings)?;
        // Force a resend so the new target gets the current level.
        self.last_level = None;
        Ok(())
    }
}
