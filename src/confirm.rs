//! Confirmation that the game process has actually stopped.
//!
//! Two signals can prove it: the game's `screen` session disappearing from
//! the host, or the game port no longer answering the status probe. Both are
//! normalised behind [`StopSignal`] so the polling loop only ever asks "is it
//! stopped yet?".

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::channel::CommandChannel;
use crate::probe::StatusProbe;
use crate::shell::{GameScripts, parse_session_probe};

/// Boxed future returned by [`StopSignal::is_stopped`].
pub type SignalFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// A single observation that reports whether the game has stopped.
pub trait StopSignal: Send + Sync {
    /// Short description used in logs and messages.
    fn describe(&self) -> &'static str;

    /// Returns `true` once the game is observed stopped. Inconclusive
    /// observations return `false`.
    fn is_stopped(&self) -> SignalFuture<'_>;
}

/// Treats an absent `screen` session as proof of shutdown.
pub struct SessionAbsence {
    shell: Arc<dyn CommandChannel>,
    probe_command: String,
    timeout: Duration,
}

impl SessionAbsence {
    /// Builds the signal from a shell channel and the session scripts.
    #[must_use]
    pub fn new(shell: Arc<dyn CommandChannel>, scripts: &GameScripts, timeout: Duration) -> Self {
        Self {
            shell,
            probe_command: scripts.session_probe(),
            timeout,
        }
    }
}

impl StopSignal for SessionAbsence {
    fn describe(&self) -> &'static str {
        "game session check over the remote shell"
    }

    fn is_stopped(&self) -> SignalFuture<'_> {
        Box::pin(async move {
            match self.shell.execute(&self.probe_command, self.timeout).await {
                Ok(result) => parse_session_probe(&result.output) == Some(false),
                Err(err) => {
                    debug!(%err, "session check inconclusive");
                    false
                }
            }
        })
    }
}

/// Treats a failing status probe as proof of shutdown.
///
/// The inversion is intentional: an unreachable game port is the only
/// evidence available when no shell is configured.
pub struct ProbeSilence {
    probe: Arc<dyn StatusProbe>,
    timeout: Duration,
}

impl ProbeSilence {
    /// Builds the signal from a status probe.
    #[must_use]
    pub fn new(probe: Arc<dyn StatusProbe>, timeout: Duration) -> Self {
        Self { probe, timeout }
    }
}

impl StopSignal for ProbeSilence {
    fn describe(&self) -> &'static str {
        "network probe going silent"
    }

    fn is_stopped(&self) -> SignalFuture<'_> {
        Box::pin(async move { self.probe.probe(self.timeout).await.is_err() })
    }
}

/// Polls a stop signal until it confirms shutdown or time runs out.
pub struct ShutdownConfirmer {
    signal: Option<Box<dyn StopSignal>>,
}

impl ShutdownConfirmer {
    /// Picks the strongest available signal: the shell session check when
    /// the shell is available, otherwise the probe when it is configured,
    /// otherwise none.
    #[must_use]
    pub fn select(
        shell: &Arc<dyn CommandChannel>,
        probe: &Arc<dyn StatusProbe>,
        scripts: &GameScripts,
        command_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        if shell.is_available() {
            return Self::with_signal(Box::new(SessionAbsence::new(
                Arc::clone(shell),
                scripts,
                command_timeout,
            )));
        }
        if probe.is_configured() {
            return Self::with_signal(Box::new(ProbeSilence::new(
                Arc::clone(probe),
                probe_timeout,
            )));
        }
        Self::none()
    }

    /// Uses `signal` for confirmation.
    #[must_use]
    pub fn with_signal(signal: Box<dyn StopSignal>) -> Self {
        Self {
            signal: Some(signal),
        }
    }

    /// A confirmer with no way to observe shutdown; it never confirms.
    #[must_use]
    pub const fn none() -> Self {
        Self { signal: None }
    }

    /// Describes the chosen signal, if any.
    #[must_use]
    pub fn method(&self) -> Option<&'static str> {
        self.signal.as_deref().map(|signal| signal.describe())
    }

    /// Polls until the signal reports the game stopped, returning `false`
    /// once `max_wait` has elapsed. Returns `false` immediately when no
    /// signal is available.
    pub async fn confirm(&self, max_wait: Duration, poll_interval: Duration) -> bool {
        let Some(signal) = self.signal.as_deref() else {
            warn!("no shutdown confirmation method is available");
            return false;
        };

        let deadline = Instant::now() + max_wait;
        while Instant::now() <= deadline {
            if signal.is_stopped().await {
                info!(method = signal.describe(), "game shutdown confirmed");
                return true;
            }
            sleep(poll_interval).await;
        }

        warn!(method = signal.describe(), ?max_wait, "game shutdown not confirmed");
        false
    }
}
