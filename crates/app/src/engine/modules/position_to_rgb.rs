use tracing::info;

use super::{ArgReader, BehaviorModule, ConfigError, check_interval, normalize};
use crate::engine::{
    data::FrameSnapshot,
    protocol::{Command, ModuleArgs, Rgb, Target},
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PositionToRgbSettings {
    pub(crate) target: Target,
    pub(crate) tracked_label: String,
    pub(crate) range_min: f32,
    pub(crate) range_max: f32,
}

impl Default for PositionToRgbSettings {
    fn default() -> Self {
        Self {
            target: Target::Object(201),
            tracked_label: "green".into(),
            range_min: -0.5,
            range_max: 0.5,
        }
    }
}

impl PositionToRgbSettings {
    fn parse(args: &ModuleArgs, current: &Self) -> Result<Self, ConfigError> {
        let mut reader = ArgReader::new(args);
        let target = reader.required::<Target>("target_ball_id")?;
        let tracked_label = reader
            .optional::<String>("tracked_label")?
            .unwrap_or_else(|| current.tracked_label.clone());
        let range_min = reader.optional("range_min")?.unwrap_or(current.range_min);
        let range_max = reader.optional("range_max")?.unwrap_or(current.range_max);
        reader.finish()?;
        check_interval("range_min/range_max", range_min, range_max)?;
        Ok(Self {
            target,
            tracked_label,
            range_min,
            range_max,
        })
    }
}

/// Colors a ball by where the tracked ball is: x, y, z drive red, green, blue.
#[derive(Debug, Default)]
pub(crate) struct PositionToRgb {
    settings: PositionToRgbSettings,
}

impl PositionToRgb {
    fn channel(&self, value: f32) -> u8 {
        (normalize(value, self.settings.range_min, self.settings.range_max) * 255.0) as u8
    }
}

impl BehaviorModule for PositionToRgb {
    fn name(&self) -> &'static str {
        "position_to_rgb"
    }

    fn setup(&mut self) {
        info!(target_ball = %self.settings.target, label = %self.settings.tracked_label, "position_to_rgb ready");
    }

    fn update(&mut self, snapshot: &FrameSnapshot, emit: &mut dyn FnMut(Command)) {
        let Some(ball) = snapshot.first_with_label(&self.settings.tracked_label) else {
            return;
        };
        let color = Rgb::new(
            self.channel(ball.world.x),
            self.channel(ball.world.y),
            self.channel(ball.world.z),
        );
        emit(Command::SendColor {
            target: self.settings.target,
            color,
        });
    }

    fn cleanup(&mut self) {
        info!("position_to_rgb stopped");
    }

    fn configure(&mut self, args: &ModuleArgs) -> Result<(), ConfigError> {
        self.settings = PositionToRgbSettings::parse(args, &self.settings)?;
        info!(target_ball = %self.settings.target, "position_to_rgb reconfigured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::data::fixtures::{observation, snapshot};

    fn collect(module: &mut PositionToRgb, snapshot: &FrameSnapshot) -> Vec<Command> {
        let mut out = Vec::new();
        module.update(snapshot, &mut |c| out.push(c));
        out
    }

    #[test]
    fn maps_first_tracked_ball_to_color() {
        let mut module = PositionToRgb::default();
        let frame = snapshot(vec![
            observation("pink", [0.5, 0.5, 0.5]),
            observation("green", [-0.5, 0.0, 0.9]),
            observation("green", [0.5, 0.5, 0.5]),
        ]);
        assert_eq!(
            collect(&mut module, &frame),
            vec![Command::SendColor {
                target: Target::Object(201),
                color: Rgb::new(0, 127, 255),
            }]
        );
    }

    #[test]
    fn nothing_emitted_without_tracked_ball() {
        let mut module = PositionToRgb::default();
        let frame = snapshot(vec![observation("orange", [0.0, 0.0, 1.0])]);
        assert!(collect(&mut module, &frame).is_empty());
    }

    #[test]
    fn configure_changes_target_and_label() {
        let mut module = PositionToRgb::default();
        let args: ModuleArgs = [("target_ball_id", "all"), ("tracked_label", "pink")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        module.configure(&args).unwrap();

        let frame = snapshot(vec![observation("pink", [0.0, 0.0, 0.0])]);
        let emitted = collect(&mut module, &frame);
        assert!(matches!(
            emitted.as_slice(),
            [Command::SendColor {
                target: Target::All,
                ..
            }]
        ));
    }

    #[test]
    fn failed_configure_keeps_previous_settings() {
        let mut module = PositionToRgb::default();
        let missing: ModuleArgs = [("tracked_label".to_string(), "pink".to_string())].into();
        assert_eq!(
            module.configure(&missing),
            Err(ConfigError::MissingKey("target_ball_id"))
        );

        let inverted: ModuleArgs = [
            ("target_ball_id".to_string(), "3".to_string()),
            ("range_min".to_string(), "1".to_string()),
            ("range_max".to_string(), "0".to_string()),
        ]
        .into();
        assert!(matches!(
            module.configure(&inverted),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(module.settings, PositionToRgbSettings::default());
    }
}
