//! The tracking engine: capture → detect → behavior module → actuation, with
//! an HTTP command channel and telemetry fan-out.
//!
//! Submodules:
//! - `config`: CLI configuration parsing.
//! - `pipeline`: Engine supervisor and the per-frame tick.
//! - `host` / `modules`: The single active behavior module and its catalog.
//! - `router`: Serializes external and internal commands onto the host.
//! - `actuator` / `datagram`: UDP color and brightness packets.
//! - `publisher` / `schema` / `console`: Telemetry fan-out and renderings.
//! - `server`: Actix Web command and telemetry endpoints.
//! - `watchdog`: Heartbeats for the tick and command threads.
//! - `protocol` / `data`: Shared command and snapshot types.

/// Re-export run settings so callers can configure the engine without
/// reaching into submodules.
pub use config::{EngineCliArgs, EngineConfig};
/// Launch the engine with a ready-made configuration.
pub use pipeline::run;
pub(crate) use protocol::{Command, CommandRequest, CommandResponse, MAX_BRIGHTNESS, ModuleArgs, Rgb, Target};
pub(crate) use telemetry::init_cli_logging;

mod actuator;
mod config;
mod console;
mod data;
mod datagram;
mod host;
mod modules;
mod pipeline;
mod protocol;
mod publisher;
mod router;
mod schema;
mod server;
mod telemetry;
mod watchdog;
