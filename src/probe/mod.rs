//! Network status probe for the game server.
//!
//! The probe performs a Server List Ping: a handshake, a status request, and
//! a JSON reply describing the version and player counts. Any failure to
//! complete the exchange means the server is not answering.

pub mod codec;

use std::fmt;
use std::net::Ipv6Addr;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Default game port.
pub const DEFAULT_GAME_PORT: u16 = 25_565;

/// Upper bound on the status JSON.
const MAX_STATUS_BYTES: usize = 65_536;

/// Address the probe connects to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeTarget {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl FromStr for ProbeTarget {
    type Err = ProbeError;

    /// Parses `host`, `host:port`, a bare IPv6 address, or `[v6]:port`;
    /// the port defaults to 25565.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || ProbeError::InvalidTarget {
            value: value.to_owned(),
        };
        let parse_port = |raw: &str| match raw.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(invalid()),
        };
        let (host, port) = if let Some(bracketed) = trimmed.strip_prefix('[') {
            let (address, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
            address.parse::<Ipv6Addr>().map_err(|_| invalid())?;
            let port = match rest {
                "" => DEFAULT_GAME_PORT,
                _ => parse_port(rest.strip_prefix(':').ok_or_else(invalid)?)?,
            };
            (address, port)
        } else if trimmed.parse::<Ipv6Addr>().is_ok() {
            (trimmed, DEFAULT_GAME_PORT)
        } else {
            match trimmed.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => return Err(invalid()),
                Some((host, port)) => (host, parse_port(port)?),
                None => (trimmed, DEFAULT_GAME_PORT),
            }
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// What a successful probe learned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeStatus {
    /// Players connected.
    pub online: u32,
    /// Advertised cap.
    pub max: u32,
    /// Version name, when reported.
    pub version: Option<String>,
}

/// Reasons a probe did not produce a status.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProbeError {
    /// No probe target is configured.
    #[error("no probe address configured (set WARDEN_PROBE_ADDRESS)")]
    Unconfigured,
    /// The target could not be parsed.
    #[error("invalid probe address '{value}': expected host or host:port")]
    InvalidTarget {
        /// Raw value.
        value: String,
    },
    /// The exchange took too long.
    #[error("probe of {target} timed out after {timeout:?}")]
    Timeout {
        /// Probed address.
        target: String,
        /// Limit that was exceeded.
        timeout: Duration,
    },
    /// The connection failed or dropped.
    #[error("{target} is unreachable: {message}")]
    Unreachable {
        /// Probed address.
        target: String,
        /// Underlying error.
        message: String,
    },
    /// The server answered with something unexpected.
    #[error("{target} sent an invalid status reply: {message}")]
    Protocol {
        /// Probed address.
        target: String,
        /// What was wrong.
        message: String,
    },
}

/// Boxed future returned by [`StatusProbe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<ProbeStatus, ProbeError>> + Send + 'a>>;

/// Lightweight check that the game server answers on its port.
pub trait StatusProbe: Send + Sync {
    /// Returns `true` when a target is configured.
    fn is_configured(&self) -> bool;

    /// Probes the server once, giving up after `timeout`.
    fn probe(&self, timeout: Duration) -> ProbeFuture<'_>;
}

/// Server List Ping probe.
#[derive(Clone, Debug, Default)]
pub struct ServerListPing {
    target: Option<ProbeTarget>,
}

impl ServerListPing {
    /// Creates a probe for `target`; `None` leaves it unconfigured.
    #[must_use]
    pub const fn new(target: Option<ProbeTarget>) -> Self {
        Self { target }
    }

    /// Returns the configured target.
    #[must_use]
    pub const fn target(&self) -> Option<&ProbeTarget> {
        self.target.as_ref()
    }
}

impl StatusProbe for ServerListPing {
    fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    fn probe(&self, limit: Duration) -> ProbeFuture<'_> {
        Box::pin(async move {
            let target = self.target.as_ref().ok_or(ProbeError::Unconfigured)?;
            match timeout(limit, ping(target)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout {
                    target: target.to_string(),
                    timeout: limit,
                }),
            }
        })
    }
}

#[derive(Deserialize)]
struct StatusReply {
    players: Option<PlayersField>,
    version: Option<VersionField>,
}

#[derive(Deserialize)]
struct PlayersField {
    online: u32,
    max: u32,
}

#[derive(Deserialize)]
struct VersionField {
    name: String,
}

async fn ping(target: &ProbeTarget) -> Result<ProbeStatus, ProbeError> {
    let unreachable = |err: std::io::Error| ProbeError::Unreachable {
        target: target.to_string(),
        message: err.to_string(),
    };
    let protocol = |message: String| ProbeError::Protocol {
        target: target.to_string(),
        message,
    };

    let mut stream = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(unreachable)?;
    stream
        .write_all(&codec::handshake(&target.host, target.port))
        .await
        .map_err(unreachable)?;
    stream
        .write_all(&codec::STATUS_REQUEST)
        .await
        .map_err(unreachable)?;

    codec::read_varint(&mut stream).await.map_err(unreachable)?;
    let packet_id = codec::read_varint(&mut stream).await.map_err(unreachable)?;
    if packet_id != 0 {
        return Err(protocol(format!("unexpected packet id {packet_id}")));
    }
    let announced = codec::read_varint(&mut stream).await.map_err(unreachable)?;
    let json_len = usize::try_from(announced)
        .ok()
        .filter(|len| *len <= MAX_STATUS_BYTES)
        .ok_or_else(|| protocol(format!("status reply of {announced} bytes is too large")))?;

    let mut json = vec![0_u8; json_len];
    stream.read_exact(&mut json).await.map_err(unreachable)?;
    let reply: StatusReply =
        serde_json::from_slice(&json).map_err(|err| protocol(err.to_string()))?;
    let players = reply
        .players
        .ok_or_else(|| protocol(String::from("reply has no players section")))?;

    debug!(%target, online = players.online, "probe answered");
    Ok(ProbeStatus {
        online: players.online,
        max: players.max,
        version: reply.version.map(|version| version.name),
    })
}
