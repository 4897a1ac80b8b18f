//! Command channels into the managed host and its game process.
//!
//! Two channels exist: a remote shell reaching the host operating system and
//! a game console reaching the game process itself. Both execute exactly one
//! command per call and keep no state between calls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Identifies the channel that produced a result or failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Shell access to the host over SSH.
    RemoteShell,
    /// RCON access to the game process.
    GameConsole,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteShell => f.write_str("remote shell"),
            Self::GameConsole => f.write_str("game console"),
        }
    }
}

/// Outcome of a command that reached the far side.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResult {
    /// Channel the command travelled over.
    pub channel: ChannelKind,
    /// Whether the command reported success.
    pub succeeded: bool,
    /// Captured output (stdout and stderr for the shell, the reply body for
    /// the console).
    pub output: String,
    /// Failure reason when `succeeded` is false.
    pub error: Option<String>,
}

impl CommandResult {
    /// Builds a successful result.
    #[must_use]
    pub fn success(channel: ChannelKind, output: impl Into<String>) -> Self {
        Self {
            channel,
            succeeded: true,
            output: output.into(),
            error: None,
        }
    }

    /// Builds a result for a command that ran but reported failure.
    #[must_use]
    pub fn failure(
        channel: ChannelKind,
        output: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            succeeded: false,
            output: output.into(),
            error: Some(reason.into()),
        }
    }
}

/// Failures raised before a command produced a result.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ChannelError {
    /// The channel lacks a host or credentials.
    #[error("{channel} is unavailable: {reason}")]
    Unavailable {
        /// Channel that is unavailable.
        channel: ChannelKind,
        /// Which setting is missing.
        reason: String,
    },
    /// The channel is switched off in configuration.
    #[error("{channel} is disabled")]
    Disabled {
        /// Channel that is disabled.
        channel: ChannelKind,
    },
    /// Connecting or executing exceeded the allotted time.
    #[error("{channel} timed out during {stage} after {timeout:?}")]
    Timeout {
        /// Channel that timed out.
        channel: ChannelKind,
        /// Either `connect` or `exec`.
        stage: &'static str,
        /// Limit that was exceeded.
        timeout: Duration,
    },
    /// Transport or protocol failure.
    #[error("{channel} failed: {message}")]
    Failed {
        /// Channel that failed.
        channel: ChannelKind,
        /// Underlying error message.
        message: String,
    },
}

impl ChannelError {
    /// Returns the channel the failure belongs to.
    #[must_use]
    pub const fn channel(&self) -> ChannelKind {
        match self {
            Self::Unavailable { channel, .. }
            | Self::Disabled { channel }
            | Self::Timeout { channel, .. }
            | Self::Failed { channel, .. } => *channel,
        }
    }
}

/// Boxed future returned by [`CommandChannel::execute`].
pub type ChannelFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandResult, ChannelError>> + Send + 'a>>;

/// A channel that executes one command per call.
pub trait CommandChannel: Send + Sync {
    /// Which channel this is.
    fn kind(&self) -> ChannelKind;

    /// Returns `true` when the channel is configured well enough to try.
    ///
    /// Callers skip unavailable channels instead of invoking them.
    fn is_available(&self) -> bool;

    /// Executes `command`, giving up after `timeout`.
    fn execute<'a>(&'a self, command: &'a str, timeout: Duration) -> ChannelFuture<'a>;
}
