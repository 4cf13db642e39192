use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use ball_tracking::{CalibrationSettings, ColorTable, SettingsStore, calibrate, rgb_to_hsv};
use clap::{Parser, Subcommand};

use crate::engine::{
    self, Command, CommandRequest, CommandResponse, EngineCliArgs, EngineConfig, MAX_BRIGHTNESS,
    ModuleArgs, Rgb, Target,
};

const CTL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "juggler-engine",
    version,
    about = "Color+depth ball tracking engine with pluggable behavior modules"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Start the engine.
    Run(EngineCliArgs),
    /// Re-derive a color's HSV range from a pixel of a still image.
    Calibrate {
        /// PNG frame to sample.
        image: PathBuf,
        /// Color profile to recalibrate.
        profile: String,
        x: i32,
        y: i32,
        #[arg(long, value_name = "PATH", default_value = "ball_settings.json")]
        settings: PathBuf,
        /// Persist the updated table; without it the result is only printed.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        save: bool,
    },
    /// Inspect or reset the color settings file.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
        #[arg(long, value_name = "PATH", default_value = "ball_settings.json", global = true)]
        path: PathBuf,
    },
    /// Send one command to a running engine.
    Ctl {
        /// Address of the engine's command server.
        #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8080")]
        addr: String,
        #[command(subcommand)]
        action: CtlAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsAction {
    /// Print every profile's ranges.
    Show,
    /// Overwrite the file with the built-in colors.
    Reset,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum CtlAction {
    Load {
        module: String,
    },
    Unload,
    Configure {
        module: String,
        /// Module setting as KEY=VALUE; repeatable.
        #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
    Color {
        /// Ball id (0-255) or `all`.
        target: Target,
        r: u8,
        g: u8,
        b: u8,
    },
    Brightness {
        target: Target,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=MAX_BRIGHTNESS as i64))]
        level: u8,
    },
}

impl From<CtlAction> for Command {
    fn from(action: CtlAction) -> Self {
        match action {
            CtlAction::Load { module } => Command::LoadModule { name: module },
            CtlAction::Unload => Command::UnloadModule,
            CtlAction::Configure { module, args } => Command::ConfigureModule {
                name: module,
                args: args.into_iter().collect::<ModuleArgs>(),
            },
            CtlAction::Color { target, r, g, b } => Command::SendColor {
                target,
                color: Rgb::new(r, g, b),
            },
            CtlAction::Brightness { target, level } => Command::SetBrightness { target, level },
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        CliCommand::Run(args) => engine::run(EngineConfig::try_from(args)?),
        CliCommand::Calibrate {
            image,
            profile,
            x,
            y,
            settings,
            save,
        } => {
            engine::init_cli_logging();
            run_calibration(&image, &profile, (x, y), &SettingsStore::new(settings), save)
        }
        CliCommand::Settings { action, path } => {
            engine::init_cli_logging();
            run_settings(action, &SettingsStore::new(path))
        }
        CliCommand::Ctl { addr, action } => {
            engine::init_cli_logging();
            let response = send_command(&addr, action.into())?;
            println!("{}", response.message);
            if !response.success {
                bail!("command rejected");
            }
            Ok(())
        }
    }
}

fn run_calibration(
    image_path: &Path,
    profile: &str,
    click: (i32, i32),
    store: &SettingsStore,
    save: bool,
) -> Result<()> {
    let frame = image::open(image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?
        .to_rgb8();
    let hsv = rgb_to_hsv(&frame);

    let mut table = store.load();
    let report = calibrate(
        &mut table,
        profile,
        &hsv,
        click,
        &CalibrationSettings::default(),
    )?;

    println!(
        "{profile}: mean HSV ({:.1}, {:.1}, {:.1}), stddev ({:.1}, {:.1}, {:.1})",
        report.mean[0], report.mean[1], report.mean[2], report.stddev[0], report.stddev[1], report.stddev[2]
    );
    println!("  primary   {:?} .. {:?}", report.primary.min, report.primary.max);
    if let Some(secondary) = report.secondary {
        println!("  secondary {:?} .. {:?}", secondary.min, secondary.max);
    }

    if save {
        store.save(&table)?;
        println!("saved to {}", store.path().display());
    } else {
        println!("not saved (pass --save to persist)");
    }
    Ok(())
}

fn run_settings(action: SettingsAction, store: &SettingsStore) -> Result<()> {
    match action {
        SettingsAction::Show => {
            print!("{}", render_table(&store.try_load()?));
            Ok(())
        }
        SettingsAction::Reset => {
            store.save(&ColorTable::starter())?;
            println!("reset {} to the built-in colors", store.path().display());
            Ok(())
        }
    }
}

fn render_table(table: &ColorTable) -> String {
    let mut out = String::new();
    for profile in table.iter() {
        out.push_str(&format!(
            "{:<8} {:?} .. {:?}",
            profile.name, profile.primary.min, profile.primary.max
        ));
        if let Some(secondary) = profile.secondary {
            out.push_str(&format!("  | {:?} .. {:?}", secondary.min, secondary.max));
        }
        out.push('\n');
    }
    out
}

fn send_command(addr: &str, command: Command) -> Result<CommandResponse> {
    let url = format!("http://{addr}/command");
    let response = reqwest::blocking::Client::builder()
        .timeout(CTL_TIMEOUT)
        .build()?
        .post(&url)
        .json(&CommandRequest::from(command))
        .send()
        .with_context(|| format!("Failed to reach engine at {url}"))?;
    let status = response.status();
    response
        .json::<CommandResponse>()
        .with_context(|| format!("Unexpected reply from engine ({status})"))
}
