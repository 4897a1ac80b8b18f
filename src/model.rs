//! Domain values shared by the lifecycle components.

use std::fmt;
use std::ops::Deref;
use std::time::SystemTime;

use serde::Serialize;

/// Coarse lifecycle state of the managed instance and its game process.
///
/// The state is derived on demand from the compute provider; the only
/// locally held state is the in-flight operation flag kept by the
/// controller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Nothing is known yet (cold start or provider failure).
    #[default]
    Unknown,
    /// The instance is powered off.
    Stopped,
    /// A start sequence is in flight.
    Starting,
    /// The instance is powered on.
    Running,
    /// A stop sequence is in flight.
    Stopping,
}

impl InstanceState {
    /// Maps a provider state label onto a lifecycle state.
    #[must_use]
    pub fn from_provider_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "starting" => Self::Starting,
            "stopping" => Self::Stopping,
            "stopped" | "stopped in place" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    /// Returns the lowercase label used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a player count.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Parsed from the game console's player list.
    Rcon,
    /// Reported by the network status probe.
    NetworkProbe,
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rcon => f.write_str("RCON"),
            Self::NetworkProbe => f.write_str("network probe"),
        }
    }
}

/// One observation of the number of connected players.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PlayerSample {
    /// Players online when the sample was taken.
    pub count: u32,
    /// Advertised player cap, when the source reports one.
    pub max: Option<u32>,
    /// Where the count came from.
    pub source: SampleSource,
    /// When the sample was taken.
    pub timestamp: SystemTime,
}

impl PlayerSample {
    /// Builds a sample stamped with the current time.
    #[must_use]
    pub fn now(count: u32, max: Option<u32>, source: SampleSource) -> Self {
        Self {
            count,
            max,
            source,
            timestamp: SystemTime::now(),
        }
    }

    /// Returns `true` when nobody is connected.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for PlayerSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}/{max} ({})", self.count, self.source),
            None => write!(f, "{} ({})", self.count, self.source),
        }
    }
}

/// Identifier of the surface that issued the most recent start request.
///
/// Notifications for asynchronous outcomes (start completion, automatic
/// shutdown) are routed here.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RequesterChannel(String);

impl RequesterChannel {
    /// Wraps a channel identifier, trimming surrounding whitespace.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_owned())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for RequesterChannel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequesterChannel {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for RequesterChannel {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for RequesterChannel {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for RequesterChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
