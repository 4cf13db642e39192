//! Command vocabulary shared by the HTTP surface, the router, and behavior modules.
//!
//! [`CommandRequest`] is the JSON wire form (tagged by `"type"`); it is
//! validated once at the boundary into a [`Command`], which is what the rest
//! of the engine passes around.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw `key -> value` module settings as they arrive on the wire.
pub type ModuleArgs = BTreeMap<String, String>;

pub const MAX_BRIGHTNESS: u8 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid ball id {0:?} (expected \"all\" or 0-255)")]
    InvalidTarget(String),
    #[error("brightness level {0} out of range 0-7")]
    BrightnessOutOfRange(u8),
    #[error("module argument {key:?} must be a string, number or bool")]
    InvalidArgument { key: String },
    #[error("module name must not be empty")]
    EmptyModuleName,
}

/// Destination of an actuator command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    All,
    Object(u8),
}

impl FromStr for Target {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Target::All);
        }
        trimmed
            .parse::<u8>()
            .map(Target::Object)
            .map_err(|_| ProtocolError::InvalidTarget(s.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => f.write_str("all"),
            Target::Object(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    LoadModule { name: String },
    UnloadModule,
    ConfigureModule { name: String, args: ModuleArgs },
    SendColor { target: Target, color: Rgb },
    SetBrightness { target: Target, level: u8 },
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::LoadModule { .. } => "LOAD_MODULE",
            Command::UnloadModule => "UNLOAD_MODULE",
            Command::ConfigureModule { .. } => "CONFIGURE_MODULE",
            Command::SendColor { .. } => "SEND_COLOR_COMMAND",
            Command::SetBrightness { .. } => "SET_BRIGHTNESS",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorCommandBody {
    pub ball_id: String,
    pub color: Rgb,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrightnessCommandBody {
    pub ball_id: String,
    pub level: u8,
}

/// JSON body of `POST /command`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandRequest {
    LoadModule {
        module_name: String,
    },
    UnloadModule,
    ConfigureModule {
        module_name: String,
        #[serde(default)]
        module_args: BTreeMap<String, serde_json::Value>,
    },
    SendColorCommand {
        color_command: ColorCommandBody,
    },
    SetBrightness {
        brightness_command: BrightnessCommandBody,
    },
}

impl TryFrom<CommandRequest> for Command {
    type Error = ProtocolError;

    fn try_from(request: CommandRequest) -> Result<Self, Self::Error> {
        Ok(match request {
            CommandRequest::LoadModule { module_name } => Command::LoadModule {
                name: module_name_checked(module_name)?,
            },
            CommandRequest::UnloadModule => Command::UnloadModule,
            CommandRequest::ConfigureModule {
                module_name,
                module_args,
            } => {
                let mut args = ModuleArgs::new();
                for (key, value) in module_args {
                    let text = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        _ => return Err(ProtocolError::InvalidArgument { key }),
                    };
                    args.insert(key, text);
                }
                Command::ConfigureModule {
                    name: module_name_checked(module_name)?,
                    args,
                }
            }
            CommandRequest::SendColorCommand { color_command } => Command::SendColor {
                target: color_command.ball_id.parse()?,
                color: color_command.color,
            },
            CommandRequest::SetBrightness { brightness_command } => {
                if brightness_command.level > MAX_BRIGHTNESS {
                    return Err(ProtocolError::BrightnessOutOfRange(brightness_command.level));
                }
                Command::SetBrightness {
                    target: brightness_command.ball_id.parse()?,
                    level: brightness_command.level,
                }
            }
        })
    }
}

impl From<Command> for CommandRequest {
    fn from(command: Command) -> Self {
        match command {
            Command::LoadModule { name } => CommandRequest::LoadModule { module_name: name },
            Command::UnloadModule => CommandRequest::UnloadModule,
            Command::ConfigureModule { name, args } => CommandRequest::ConfigureModule {
                module_name: name,
                module_args: args
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect(),
            },
            Command::SendColor { target, color } => CommandRequest::SendColorCommand {
                color_command: ColorCommandBody {
                    ball_id: target.to_string(),
                    color,
                },
            },
            Command::SetBrightness { target, level } => CommandRequest::SetBrightness {
                brightness_command: BrightnessCommandBody {
                    ball_id: target.to_string(),
                    level,
                },
            },
        }
    }
}

fn module_name_checked(name: String) -> Result<String, ProtocolError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyModuleName);
    }
    Ok(trimmed.to_string())
}
