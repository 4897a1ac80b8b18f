//! Lifecycle controller for the instance and its game server.
//!
//! The controller serialises start, stop, and restart behind a single
//! operation token, drives the compute backend and both command channels
//! through each sequence, and always reports the outcome to the requester.
//! Transitions to running or stopped are published to a
//! [`LifecycleListener`], which is how the automatic shutdown monitor is
//! started and halted.

mod operation;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::channel::{ChannelKind, CommandChannel};
use crate::compute::{ComputeBackend, ComputeError};
use crate::confirm::ShutdownConfirmer;
use crate::model::{InstanceState, PlayerSample, RequesterChannel};
use crate::notify::Notifier;
use crate::probe::{ProbeStatus, StatusProbe};
use crate::shell::{GameScripts, parse_session_probe};
use crate::state_store::{RequesterStore, load_requester, save_requester};
use crate::status::{PlayerSampler, StatusAggregator, StatusReport};

pub use operation::{LifecycleOperation, OperationKind};

/// Waits and timeouts used by the lifecycle sequences.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LifecycleTimings {
    /// Pause after the instance reports running, before launching the game.
    pub boot_grace: Duration,
    /// How long to wait for the game to answer the probe after launch.
    pub start_timeout: Duration,
    /// Pause between probes while waiting for the game.
    pub start_poll_interval: Duration,
    /// How long to wait for shutdown confirmation.
    pub max_wait: Duration,
    /// Pause between shutdown confirmation polls.
    pub poll_interval: Duration,
    /// Limit for a single shell or console command.
    pub command_timeout: Duration,
    /// Limit for a single status probe.
    pub probe_timeout: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            boot_grace: Duration::from_secs(30),
            start_timeout: Duration::from_secs(300),
            start_poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(300),
            poll_interval: Duration::from_secs(3),
            command_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Which channel a graceful stop tries first; the other is the fallback.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StopPreference {
    /// Game console first, remote shell second.
    #[default]
    ConsoleFirst,
    /// Remote shell first, game console second.
    ShellFirst,
}

/// Raised when a stop preference cannot be parsed.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown stop channel '{0}'")]
pub struct UnknownStopPreference(pub String);

impl FromStr for StopPreference {
    type Err = UnknownStopPreference;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "console" | "rcon" => Ok(Self::ConsoleFirst),
            "shell" | "ssh" => Ok(Self::ShellFirst),
            other => Err(UnknownStopPreference(other.to_owned())),
        }
    }
}

/// Receives lifecycle transitions.
pub trait LifecycleListener: Send + Sync {
    /// The instance is running (or was found running).
    fn on_running(&self);
    /// The instance is stopped (or was found stopped).
    fn on_stopped(&self);
}

/// Collaborators driven by the controller.
#[derive(Clone)]
pub struct LifecycleDeps {
    /// Compute provider for the instance.
    pub compute: Arc<dyn ComputeBackend>,
    /// Shell channel to the host.
    pub shell: Arc<dyn CommandChannel>,
    /// Console channel to the game.
    pub console: Arc<dyn CommandChannel>,
    /// Network status probe.
    pub probe: Arc<dyn StatusProbe>,
    /// Requester persistence.
    pub store: Arc<dyn RequesterStore>,
    /// Outbound notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Shell snippets for the game session.
    pub scripts: GameScripts,
}

/// Errors returned by lifecycle operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Another start, stop, or restart holds the operation token.
    #[error("another lifecycle operation is already in progress")]
    OperationInProgress,
    /// Compute credentials or the instance are not configured.
    #[error("compute backend is not configured: {0}")]
    Unconfigured(String),
    /// The provider failed to start the instance.
    #[error("failed to start the instance: {0}")]
    StartFailed(#[source] ComputeError),
    /// The provider failed to stop the instance.
    #[error("failed to stop the instance: {0}")]
    StopFailed(#[source] ComputeError),
    /// Shutdown was not confirmed, so the instance was left running.
    #[error("could not confirm the game stopped ({reason}); the instance was left running")]
    ConfirmationFailed {
        /// Why confirmation failed.
        reason: String,
    },
    /// The provider could not be queried.
    #[error("could not query the instance: {0}")]
    Backend(#[source] ComputeError),
    /// Neither command channel is available.
    #[error("neither the remote shell nor the game console is available")]
    NoChannel,
    /// The relaunch command did not succeed.
    #[error("relaunching the game failed: {0}")]
    RelaunchFailed(String),
}

/// Result of a start request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StartOutcome {
    /// The game answered the probe.
    Running(StatusReport),
    /// The instance is up but the game did not answer in time, or there is
    /// no probe to ask.
    StillStarting,
}

/// Result of a stop request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StopOutcome {
    /// The instance was not running; nothing was done.
    AlreadyStopped,
    /// The game stopped and the instance was deallocated.
    Stopped {
        /// Channel that delivered the graceful stop, if any did.
        graceful: Option<ChannelKind>,
    },
}

/// Result of a restart request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestartOutcome {
    /// The instance is not running; use start instead.
    NotRunning,
    /// The game was killed and relaunched through the shell.
    Relaunched,
    /// Only a graceful console stop was sent; the game was not relaunched.
    ConsoleStopOnly,
}

impl fmt::Display for StartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running(report) => write!(f, "{report}"),
            Self::StillStarting => f.write_str("instance started; game not answering yet"),
        }
    }
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStopped => f.write_str("instance was already stopped"),
            Self::Stopped {
                graceful: Some(channel),
            } => write!(f, "game stopped via {channel}; instance deallocated"),
            Self::Stopped { graceful: None } => {
                f.write_str("game stopped without a graceful command; instance deallocated")
            }
        }
    }
}

impl fmt::Display for RestartOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning => f.write_str("instance is not running"),
            Self::Relaunched => f.write_str("game relaunched"),
            Self::ConsoleStopOnly => f.write_str("game stopped via console; not relaunched"),
        }
    }
}

/// Serialised lifecycle orchestration.
pub struct LifecycleController {
    deps: LifecycleDeps,
    timings: LifecycleTimings,
    token: Arc<tokio::sync::Mutex<()>>,
    in_flight: Arc<Mutex<Option<OperationKind>>>,
    listener: Mutex<Option<Weak<dyn LifecycleListener>>>,
}

impl LifecycleController {
    /// Builds a controller.
    #[must_use]
    pub fn new(deps: LifecycleDeps, timings: LifecycleTimings) -> Self {
        Self {
            deps,
            timings,
            token: Arc::new(tokio::sync::Mutex::new(())),
            in_flight: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    /// Returns the configured timings.
    #[must_use]
    pub const fn timings(&self) -> &LifecycleTimings {
        &self.timings
    }

    /// Registers the receiver of lifecycle transitions. Only a weak
    /// reference is kept.
    pub fn attach_listener<L: LifecycleListener + 'static>(&self, listener: &Arc<L>) {
        let shared: Arc<dyn LifecycleListener> = Arc::<L>::clone(listener);
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::downgrade(&shared));
    }

    /// Returns the operation currently holding the token, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<OperationKind> {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Derives the current state: the in-flight operation wins, otherwise
    /// the provider is asked.
    pub async fn state(&self) -> InstanceState {
        if let Some(kind) = self.in_flight() {
            return kind.transitional_state();
        }
        match self.deps.compute.describe().await {
            Ok(status) => status.state,
            Err(err) => {
                debug!(%err, "state unknown");
                InstanceState::Unknown
            }
        }
    }

    /// Returns the consolidated status, overlaying any in-flight operation.
    pub async fn status(&self) -> StatusReport {
        let mut report = self.aggregator().collect().await;
        if let Some(kind) = self.in_flight() {
            report.state = kind.transitional_state();
        }
        report
    }

    /// Asks the provider whether the instance is running.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the provider cannot be queried.
    pub async fn compute_running(&self) -> Result<bool, ComputeError> {
        self.deps.compute.is_running().await
    }

    /// Takes one player sample.
    pub async fn sample_players(&self) -> Option<PlayerSample> {
        self.sampler().sample().await
    }

    /// Returns the stored requester, logging read failures.
    pub async fn requester(&self) -> Option<RequesterChannel> {
        load_requester(&self.deps.store).await.unwrap_or_else(|err| {
            warn!(%err, "could not read the stored requester");
            None
        })
    }

    /// Notifies the stored requester, or logs when there is none.
    pub async fn notify_requester(&self, text: &str) {
        match self.requester().await {
            Some(channel) => self.deps.notifier.notify(&channel, text).await,
            None => info!(text, "no requester on record for notification"),
        }
    }

    /// Starts the instance and the game.
    ///
    /// The requester is recorded, the instance powered on, the game launched
    /// after the boot grace period, and the probe polled until the game
    /// answers or the start timeout passes.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OperationInProgress`] when another operation
    /// holds the token, [`LifecycleError::Unconfigured`] without compute
    /// credentials, and [`LifecycleError::StartFailed`] when the provider
    /// fails.
    pub async fn start(&self, requester: RequesterChannel) -> Result<StartOutcome, LifecycleError> {
        let operation = self.begin(OperationKind::Start)?;
        let span = info_span!("start", operation = %operation.id(), %requester);
        async move {
            if let Err(err) = save_requester(&self.deps.store, &requester).await {
                warn!(%err, "could not record the requester");
            }
            let outcome = self.run_start(&requester).await;
            drop(operation);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Gracefully stops the game and deallocates the instance, trying the
    /// console first.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::stop_with`].
    pub async fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        self.stop_with(StopPreference::ConsoleFirst).await
    }

    /// Gracefully stops the game and deallocates the instance.
    ///
    /// The instance is deallocated only after the game is confirmed stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OperationInProgress`] when another operation
    /// holds the token, [`LifecycleError::ConfirmationFailed`] when shutdown
    /// cannot be confirmed, and [`LifecycleError::StopFailed`] when the
    /// provider fails to stop the instance.
    pub async fn stop_with(
        &self,
        preference: StopPreference,
    ) -> Result<StopOutcome, LifecycleError> {
        let operation = self.begin(OperationKind::Stop)?;
        let span = info_span!("stop", operation = %operation.id(), ?preference);
        async move {
            let outcome = self.run_stop(preference).await;
            drop(operation);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Kills and relaunches the game through the shell, or falls back to a
    /// graceful console stop when the shell is unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::OperationInProgress`] when another operation
    /// holds the token, [`LifecycleError::NoChannel`] when neither channel is
    /// available, and [`LifecycleError::RelaunchFailed`] when the launch
    /// command fails.
    pub async fn restart(&self) -> Result<RestartOutcome, LifecycleError> {
        let operation = self.begin(OperationKind::Restart)?;
        let span = info_span!("restart", operation = %operation.id());
        async move {
            let outcome = self.run_restart().await;
            drop(operation);
            outcome
        }
        .instrument(span)
        .await
    }

    fn begin(&self, kind: OperationKind) -> Result<LifecycleOperation, LifecycleError> {
        LifecycleOperation::acquire(kind, &self.token, &self.in_flight).ok_or_else(|| {
            info!(?kind, "rejected: another operation is in progress");
            LifecycleError::OperationInProgress
        })
    }

    async fn run_start(&self, requester: &RequesterChannel) -> Result<StartOutcome, LifecycleError> {
        let compute = &self.deps.compute;
        if !compute.is_configured() {
            let reason = match compute.describe().await {
                Err(ComputeError::Unconfigured(reason)) => reason,
                _ => String::from("credentials or instance id missing"),
            };
            let err = LifecycleError::Unconfigured(reason);
            self.tell(requester, &format!("Cannot start the server: {err}")).await;
            return Err(err);
        }

        self.tell(requester, "Starting the server instance...").await;
        if let Err(err) = compute.start().await {
            let failure = match err {
                ComputeError::Unconfigured(reason) => LifecycleError::Unconfigured(reason),
                other => LifecycleError::StartFailed(other),
            };
            self.tell(requester, &format!("Server start failed: {failure}")).await;
            return Err(failure);
        }
        self.publish_running();

        info!(grace = ?self.timings.boot_grace, "instance running; waiting for boot");
        sleep(self.timings.boot_grace).await;
        self.launch_game(requester).await;

        if let Some(status) = self.wait_until_online().await {
            info!(online = status.online, "game answered the probe");
            let report = self.aggregator().collect().await;
            self.tell(requester, &format!("The server is up.\n{report}")).await;
            return Ok(StartOutcome::Running(report));
        }

        self.tell(
            requester,
            "The instance is running but the game is still starting; check the status again in a few minutes.",
        )
        .await;
        Ok(StartOutcome::StillStarting)
    }

    async fn launch_game(&self, requester: &RequesterChannel) {
        let shell = &self.deps.shell;
        if !shell.is_available() {
            warn!("remote shell unavailable; game launch skipped");
            self.tell(
                requester,
                "The remote shell is not configured, so the game was not launched; it will only come up if the host starts it on boot.",
            )
            .await;
            return;
        }
        if self.session_present().await {
            info!("game session already present; launch skipped");
            self.tell(requester, "The game is already running; it was not launched again.")
                .await;
            return;
        }
        match shell
            .execute(&self.deps.scripts.launch(), self.timings.command_timeout)
            .await
        {
            Ok(result) if result.succeeded => info!("game launch dispatched"),
            Ok(result) => {
                let reason = result.error.unwrap_or_default();
                warn!(%reason, output = %result.output, "game launch reported failure");
                self.tell(requester, &format!("The game launch command failed: {reason}"))
                    .await;
            }
            Err(err) => {
                warn!(%err, "game launch failed");
                self.tell(requester, &format!("The game launch command failed: {err}"))
                    .await;
            }
        }
    }

    /// Whether the game's `screen` session already exists. An inconclusive
    /// check counts as absent.
    async fn session_present(&self) -> bool {
        match self
            .deps
            .shell
            .execute(&self.deps.scripts.session_probe(), self.timings.command_timeout)
            .await
        {
            Ok(result) => parse_session_probe(&result.output) == Some(true),
            Err(err) => {
                debug!(%err, "session check inconclusive before launch");
                false
            }
        }
    }

    async fn wait_until_online(&self) -> Option<ProbeStatus> {
        let probe = &self.deps.probe;
        if !probe.is_configured() {
            return None;
        }
        let deadline = Instant::now() + self.timings.start_timeout;
        while Instant::now() <= deadline {
            match probe.probe(self.timings.probe_timeout).await {
                Ok(status) => return Some(status),
                Err(err) => debug!(%err, "game not answering yet"),
            }
            sleep(self.timings.start_poll_interval).await;
        }
        None
    }

    async fn run_stop(&self, preference: StopPreference) -> Result<StopOutcome, LifecycleError> {
        if !self.check_running().await? {
            self.notify_requester("The server is already stopped.").await;
            self.publish_stopped();
            return Ok(StopOutcome::AlreadyStopped);
        }

        self.notify_requester("Stopping the game server...").await;
        let graceful = self.send_graceful_stop(preference).await;
        if graceful.is_none() {
            warn!("no channel delivered the graceful stop");
        }

        let confirmer = self.confirmer();
        if !confirmer
            .confirm(self.timings.max_wait, self.timings.poll_interval)
            .await
        {
            let reason = confirmer.method().map_or_else(
                || String::from("no way to observe the game: configure the remote shell or a probe address"),
                |method| format!("{method} still shows the game after {:?}", self.timings.max_wait),
            );
            let err = LifecycleError::ConfirmationFailed { reason };
            self.notify_requester(&format!("Stop aborted: {err}")).await;
            return Err(err);
        }

        let still_running = self.deps.compute.is_running().await.unwrap_or(true);
        if still_running {
            if let Err(err) = self.deps.compute.stop().await {
                let failure = LifecycleError::StopFailed(err);
                self.notify_requester(&format!("The game stopped but {failure}"))
                    .await;
                return Err(failure);
            }
        } else {
            info!("instance already powered off after the game stopped");
        }

        self.publish_stopped();
        let outcome = StopOutcome::Stopped { graceful };
        self.notify_requester(&format!("Server stopped: {outcome}.")).await;
        Ok(outcome)
    }

    async fn send_graceful_stop(&self, preference: StopPreference) -> Option<ChannelKind> {
        let order = match preference {
            StopPreference::ConsoleFirst => [&self.deps.console, &self.deps.shell],
            StopPreference::ShellFirst => [&self.deps.shell, &self.deps.console],
        };
        for channel in order {
            let kind = channel.kind();
            if !channel.is_available() {
                debug!(%kind, "skipping unavailable channel");
                continue;
            }
            let command = self.stop_command_for(kind);
            match channel.execute(&command, self.timings.command_timeout).await {
                Ok(result) if result.succeeded => {
                    info!(%kind, "graceful stop sent");
                    return Some(kind);
                }
                Ok(result) => warn!(%kind, error = ?result.error, "graceful stop reported failure"),
                Err(err) => warn!(%kind, %err, "graceful stop failed"),
            }
        }
        None
    }

    fn stop_command_for(&self, kind: ChannelKind) -> String {
        match kind {
            ChannelKind::GameConsole => self.deps.scripts.console_stop_command().to_owned(),
            ChannelKind::RemoteShell => self.deps.scripts.stop_signal(),
        }
    }

    async fn run_restart(&self) -> Result<RestartOutcome, LifecycleError> {
        if !self.check_running().await? {
            self.notify_requester("The server is not running; use start instead.")
                .await;
            return Ok(RestartOutcome::NotRunning);
        }

        let shell = &self.deps.shell;
        if shell.is_available() {
            let timeout = self.timings.command_timeout;
            if let Err(err) = shell.execute(&self.deps.scripts.force_kill(), timeout).await {
                warn!(%err, "force kill failed; relaunching anyway");
            }
            return match shell.execute(&self.deps.scripts.launch(), timeout).await {
                Ok(result) if result.succeeded => {
                    self.notify_requester("The game was restarted.").await;
                    Ok(RestartOutcome::Relaunched)
                }
                Ok(result) => {
                    let err = LifecycleError::RelaunchFailed(result.error.unwrap_or_default());
                    self.notify_requester(&format!("Restart failed: {err}")).await;
                    Err(err)
                }
                Err(err) => {
                    let failure = LifecycleError::RelaunchFailed(err.to_string());
                    self.notify_requester(&format!("Restart failed: {failure}")).await;
                    Err(failure)
                }
            };
        }

        let console = &self.deps.console;
        if console.is_available() {
            let command = self.stop_command_for(ChannelKind::GameConsole);
            if let Err(err) = console
                .execute(&command, self.timings.command_timeout)
                .await
            {
                warn!(%err, "console stop failed during restart");
            }
            self.notify_requester(
                "The remote shell is unavailable, so the game was only stopped through the console and was NOT relaunched.",
            )
            .await;
            return Ok(RestartOutcome::ConsoleStopOnly);
        }

        let err = LifecycleError::NoChannel;
        self.notify_requester(&format!("Restart failed: {err}")).await;
        Err(err)
    }

    async fn check_running(&self) -> Result<bool, LifecycleError> {
        match self.deps.compute.is_running().await {
            Ok(running) => Ok(running),
            Err(ComputeError::Unconfigured(reason)) => {
                let err = LifecycleError::Unconfigured(reason);
                self.notify_requester(&format!("Cannot act on the server: {err}"))
                    .await;
                Err(err)
            }
            Err(other) => {
                let err = LifecycleError::Backend(other);
                self.notify_requester(&format!("Cannot act on the server: {err}"))
                    .await;
                Err(err)
            }
        }
    }

    async fn tell(&self, channel: &RequesterChannel, text: &str) {
        self.deps.notifier.notify(channel, text).await;
    }

    fn confirmer(&self) -> ShutdownConfirmer {
        ShutdownConfirmer::select(
            &self.deps.shell,
            &self.deps.probe,
            &self.deps.scripts,
            self.timings.command_timeout,
            self.timings.probe_timeout,
        )
    }

    fn sampler(&self) -> PlayerSampler {
        PlayerSampler::new(
            Arc::clone(&self.deps.console),
            Arc::clone(&self.deps.probe),
            self.timings.command_timeout,
            self.timings.probe_timeout,
        )
    }

    fn aggregator(&self) -> StatusAggregator {
        StatusAggregator::new(
            Arc::clone(&self.deps.compute),
            self.sampler(),
            Arc::clone(&self.deps.store),
        )
    }

    fn listener(&self) -> Option<Arc<dyn LifecycleListener>> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn publish_running(&self) {
        if let Some(listener) = self.listener() {
            listener.on_running();
        }
    }

    fn publish_stopped(&self) {
        if let Some(listener) = self.listener() {
            listener.on_stopped();
        }
    }
}
