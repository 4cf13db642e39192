//! Persistent actuator: turns color/brightness commands into UDP datagrams.

use std::{
    fmt,
    io,
    net::{Ipv4Addr, SocketAddrV4, UdpSocket},
    str::FromStr,
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{
    datagram::{encode_brightness, encode_color},
    protocol::{Command, CommandResponse, Target},
};

pub(crate) const DEFAULT_SUBNET: Subnet = Subnet([10, 54, 136]);
pub(crate) const DEFAULT_PORT: u16 = 41412;

#[derive(Debug, Error)]
pub(crate) enum ActuatorError {
    #[error("invalid subnet prefix {0:?} (expected three dotted octets, e.g. 10.54.136)")]
    InvalidSubnet(String),
    #[error("datagram to {dest} failed: {source}")]
    Send { dest: SocketAddrV4, source: io::Error },
}

/// First three octets of the ball network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Subnet(pub(crate) [u8; 3]);

impl Subnet {
    pub(crate) fn host(&self, last: u8) -> Ipv4Addr {
        let [a, b, c] = self.0;
        Ipv4Addr::new(a, b, c, last)
    }

    pub(crate) fn broadcast(&self) -> Ipv4Addr {
        self.host(255)
    }
}

impl FromStr for Subnet {
    type Err = ActuatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ActuatorError::InvalidSubnet(s.to_string());
        let octets: Vec<u8> = s
            .trim()
            .trim_end_matches('.')
            .split('.')
            .map(|part| part.parse::<u8>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        match octets.as_slice() {
            [a, b, c] => Ok(Subnet([*a, *b, *c])),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ActuatorConfig {
    pub(crate) subnet: Subnet,
    pub(crate) port: u16,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            subnet: DEFAULT_SUBNET,
            port: DEFAULT_PORT,
        }
    }
}

impl ActuatorConfig {
    /// Destination for `target`, and whether it is the broadcast address.
    pub(crate) fn destination(&self, target: Target) -> (SocketAddrV4, bool) {
        match target {
            Target::All => (SocketAddrV4::new(self.subnet.broadcast(), self.port), true),
            Target::Object(id) => (SocketAddrV4::new(self.subnet.host(id), self.port), false),
        }
    }
}

/// Where encoded datagrams go.
pub(crate) trait DatagramSink: Send + Sync {
    fn send(&self, payload: &[u8], dest: SocketAddrV4, broadcast: bool) -> Result<(), ActuatorError>;
}

/// Opens a fresh socket for every datagram.
#[derive(Debug, Default)]
pub(crate) struct UdpSink;

impl DatagramSink for UdpSink {
    fn send(&self, payload: &[u8], dest: SocketAddrV4, broadcast: bool) -> Result<(), ActuatorError> {
        let send_err = |source| ActuatorError::Send { dest, source };
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(send_err)?;
        if broadcast {
            socket.set_broadcast(true).map_err(send_err)?;
        }
        socket.send_to(payload, dest).map_err(send_err)?;
        Ok(())
    }
}

pub(crate) struct ActuatorModule {
    config: ActuatorConfig,
    sink: Box<dyn DatagramSink>,
}

impl ActuatorModule {
    pub(crate) fn new(config: ActuatorConfig, sink: Box<dyn DatagramSink>) -> Self {
        Self { config, sink }
    }

    pub(crate) fn udp(config: ActuatorConfig) -> Self {
        Self::new(config, Box::new(UdpSink))
    }

    pub(crate) fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    /// Whether this module is the handler for `command`.
    pub(crate) fn handles(command: &Command) -> bool {
        matches!(command, Command::SendColor { .. } | Command::SetBrightness { .. })
    }

    /// Encode and send one actuator command. Failures are logged and counted,
    /// never retried.
    pub(crate) fn handle(&self, command: &Command) -> CommandResponse {
        let (target, payload, what): (Target, Vec<u8>, String) = match command {
            Command::SendColor { target, color } => (
                *target,
                encode_color(*color).to_vec(),
                format!("color ({}, {}, {})", color.r, color.g, color.b),
            ),
            Command::SetBrightness { target, level } => (
                *target,
                encode_brightness(*level).to_vec(),
                format!("brightness {level}"),
            ),
            other => {
                return CommandResponse::fail(format!(
                    "actuator cannot handle {}",
                    other.kind()
                ));
            }
        };

        let (dest, broadcast) = self.config.destination(target);
        match self.sink.send(&payload, dest, broadcast) {
            Ok(()) => {
                debug!(%dest, "sent {what}");
                CommandResponse::ok(format!("sent {what} to ball {target}"))
            }
            Err(err) => {
                warn!("{err}");
                metrics::counter!("juggler_datagram_errors_total").increment(1);
                CommandResponse::fail(err.to_string())
            }
        }
    }
}
