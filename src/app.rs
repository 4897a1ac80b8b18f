//! Wiring of configuration into a running controller and monitor.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ComputeConfig, ConfigError, WardenConfig};
use crate::console::{ConsoleConfig, ConsoleConfigError, GameConsole};
use crate::controller::{LifecycleController, LifecycleDeps};
use crate::monitor::{AutoShutdownMonitor, MonitorSettings};
use crate::notify::Notifier;
use crate::probe::ServerListPing;
use crate::scaleway::ScalewayBackend;
use crate::shell::{GameScripts, RemoteShell, ShellConfig, ShellConfigError};
use crate::state_store::FileRequesterStore;

/// Errors raised while loading or wiring configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum AppError {
    /// Lifecycle or compute settings are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Remote shell settings are unusable.
    #[error(transparent)]
    Shell(#[from] ShellConfigError),
    /// Game console settings are unusable.
    #[error(transparent)]
    Console(#[from] ConsoleConfigError),
}

/// Every configuration layer the service needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WardenSources {
    /// Scaleway credentials and instance.
    pub compute: ComputeConfig,
    /// SSH settings and the game session layout.
    pub shell: ShellConfig,
    /// RCON settings.
    pub console: ConsoleConfig,
    /// Lifecycle tunables.
    pub warden: WardenConfig,
}

impl WardenSources {
    /// Loads all layers from defaults, `warden.toml`, and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when any layer fails to merge.
    pub fn load_without_cli_args() -> Result<Self, AppError> {
        Ok(Self {
            compute: ComputeConfig::load_without_cli_args()?,
            shell: ShellConfig::load_without_cli_args()?,
            console: ConsoleConfig::load_without_cli_args()?,
            warden: WardenConfig::load_without_cli_args()?,
        })
    }

    /// Tuning for the automatic shutdown monitor.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the stop channel is unknown.
    pub fn monitor_settings(&self) -> Result<MonitorSettings, AppError> {
        Ok(MonitorSettings {
            interval: self.warden.auto_shutdown_interval(),
            threshold: self.warden.empty_sample_threshold,
            stop_preference: self.warden.auto_shutdown_preference()?,
        })
    }
}

/// The assembled service: a controller with its monitor attached.
pub struct Warden {
    controller: Arc<LifecycleController>,
    monitor: Arc<AutoShutdownMonitor>,
}

impl Warden {
    /// Builds real collaborators from `sources` and wires them together.
    ///
    /// Missing compute credentials or channel hosts are not fatal: the
    /// affected component reports itself unconfigured or unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when a configured value is invalid.
    pub fn assemble(sources: &WardenSources, notifier: Arc<dyn Notifier>) -> Result<Self, AppError> {
        sources.warden.validate()?;
        if let Err(err) = sources.compute.validate() {
            warn!(%err, "compute backend unconfigured; start and stop will fail");
        }

        let shell = RemoteShell::with_process_runner(sources.shell.clone())?;
        let console = GameConsole::new(sources.console.clone())?;
        let deps = LifecycleDeps {
            compute: Arc::new(ScalewayBackend::new(&sources.compute)),
            shell: Arc::new(shell),
            console: Arc::new(console),
            probe: Arc::new(ServerListPing::new(sources.warden.probe_target()?)),
            store: Arc::new(FileRequesterStore::new(sources.warden.state_file.as_str())),
            notifier,
            scripts: GameScripts::new(&sources.shell, &sources.console.stop_command),
        };
        let controller = Arc::new(LifecycleController::new(deps, sources.warden.timings()));
        Ok(Self::with_controller(controller, sources.monitor_settings()?))
    }

    /// Attaches a monitor to an existing controller.
    #[must_use]
    pub fn with_controller(controller: Arc<LifecycleController>, settings: MonitorSettings) -> Self {
        let monitor = AutoShutdownMonitor::new(Arc::clone(&controller), settings);
        controller.attach_listener(&monitor);
        info!(
            threshold = settings.threshold,
            interval = ?settings.interval,
            "lifecycle controller ready"
        );
        Self {
            controller,
            monitor,
        }
    }

    /// The lifecycle controller.
    #[must_use]
    pub const fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// The automatic shutdown monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<AutoShutdownMonitor> {
        &self.monitor
    }

    /// Schedules the monitor when the instance is already running, which
    /// covers a service restart while the game is up.
    pub async fn resume_monitoring(&self) {
        match self.controller.compute_running().await {
            Ok(true) => self.monitor.start(),
            Ok(false) => info!("instance stopped; automatic shutdown idle"),
            Err(err) => warn!(%err, "instance state unknown; automatic shutdown idle"),
        }
    }
}
