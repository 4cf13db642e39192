//! Configuration parsing for the engine.
//!
//! Translates the `run` subcommand's CLI arguments into an [`EngineConfig`]
//! that the pipeline consumes without re-parsing flags.

use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result, bail};
use ball_tracking::TrackerConfig;
use clap::Args;
use depth_ingest::{DEFAULT_MODE_CANDIDATES, StreamMode};

use crate::engine::{
    actuator::{ActuatorConfig, DEFAULT_PORT, Subnet},
    console::OutputFormat,
};

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraSource {
    /// Rendered test scene.
    Synthetic,
    /// Directory of recorded color/depth PNGs.
    Recording(PathBuf),
}

impl CameraSource {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("synthetic") {
            CameraSource::Synthetic
        } else {
            CameraSource::Recording(PathBuf::from(raw))
        }
    }
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing and runtime inspection.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing engine spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Enable the Tokio console subscriber for live task inspection.
    pub enable_tokio_console: bool,
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by every engine component.
pub struct EngineConfig {
    pub camera: CameraSource,
    /// Stream modes to try, in priority order.
    pub modes: Vec<StreamMode>,
    pub settings_path: PathBuf,
    pub tracker: TrackerConfig,
    pub output_format: OutputFormat,
    pub console: bool,
    pub http_addr: SocketAddr,
    pub(crate) actuator: ActuatorConfig,
    pub telemetry: TelemetryOptions,
}

/// CLI arguments accepted by the `run` subcommand.
#[derive(Debug, Args)]
pub struct EngineCliArgs {
    /// `synthetic` or a recording directory.
    #[arg(long, value_name = "SOURCE", default_value = "synthetic")]
    pub camera: String,
    /// Stream mode to try, as WIDTHxHEIGHT@FPS. Repeat for fallbacks, highest priority first.
    #[arg(long = "mode", value_name = "WxH@FPS")]
    pub modes: Vec<StreamMode>,
    /// Color settings file.
    #[arg(long, value_name = "PATH", default_value = "ball_settings.json")]
    pub settings: PathBuf,
    /// Detect on a downscaled image (0 < f <= 1).
    #[arg(long, value_name = "FACTOR", default_value_t = 1.0)]
    pub downscale: f64,
    /// Per-tick stdout format.
    #[arg(long = "output-format", value_enum, default_value_t = OutputFormat::Default)]
    pub output_format: OutputFormat,
    /// Command and telemetry server address.
    #[arg(long = "http-addr", value_name = "ADDR", default_value = "127.0.0.1:8080")]
    pub http_addr: String,
    /// First three octets of the ball network.
    #[arg(long = "actuator-subnet", value_name = "A.B.C", default_value = "10.54.136")]
    pub actuator_subnet: String,
    /// UDP port the balls listen on.
    #[arg(long = "actuator-port", value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub actuator_port: u16,
    /// Do not print per-tick output.
    #[arg(long = "no-console", action = clap::ArgAction::SetTrue)]
    pub no_console: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Enable the Tokio console instrumentation server.
    #[arg(long = "tokio-console", action = clap::ArgAction::SetTrue)]
    pub tokio_console: bool,
}

impl TryFrom<EngineCliArgs> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(args: EngineCliArgs) -> Result<Self> {
        if !(args.downscale > 0.0 && args.downscale <= 1.0) {
            bail!("--downscale must be in (0, 1], got {}", args.downscale);
        }

        let camera = CameraSource::parse(args.camera.trim());
        if let CameraSource::Recording(dir) = &camera {
            if !dir.is_dir() {
                bail!(
                    "--camera must be `synthetic` or a recording directory; {} is not a directory",
                    dir.display()
                );
            }
        }

        let modes = if args.modes.is_empty() {
            DEFAULT_MODE_CANDIDATES.to_vec()
        } else {
            args.modes
        };

        let http_addr: SocketAddr = args
            .http_addr
            .parse()
            .with_context(|| format!("--http-addr {:?} is not a socket address", args.http_addr))?;

        let subnet: Subnet = args
            .actuator_subnet
            .parse()
            .context("invalid --actuator-subnet")?;
        if args.actuator_port == 0 {
            bail!("--actuator-port must be non-zero");
        }

        let tracker = TrackerConfig {
            downscale: args.downscale,
            ..TrackerConfig::default()
        };

        let telemetry = TelemetryOptions {
            chrome_trace_path: args.chrome_trace,
            enable_tokio_console: args.tokio_console,
        };

        Ok(Self {
            camera,
            modes,
            settings_path: args.settings,
            tracker,
            output_format: args.output_format,
            console: !args.no_console,
            http_addr,
            actuator: ActuatorConfig {
                subnet,
                port: args.actuator_port,
            },
            telemetry,
        })
    }
}
