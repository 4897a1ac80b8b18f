//! Core library for the Warden game server lifecycle controller.
//!
//! The crate starts and stops a single game server hosted on a Scaleway
//! instance. Two command channels reach the server: a remote shell
//! (SSH + `screen`) and the game console (RCON). A network status probe
//! (Server List Ping) observes it from outside. The controller serialises
//! start, stop, and restart, deallocates the instance only after the game is
//! confirmed stopped, and an automatic shutdown monitor stops the server
//! after a run of empty player samples.

pub mod app;
pub mod channel;
pub mod compute;
pub mod config;
pub mod confirm;
pub mod console;
pub mod controller;
pub mod model;
pub mod monitor;
pub mod notify;
pub mod probe;
pub mod scaleway;
pub mod shell;
pub mod state_store;
pub mod status;
pub mod test_support;

pub use app::{AppError, Warden, WardenSources};
pub use channel::{ChannelError, ChannelKind, CommandChannel, CommandResult};
pub use compute::{ComputeBackend, ComputeError, ComputeStatus};
pub use config::{ComputeConfig, ConfigError, WardenConfig};
pub use confirm::ShutdownConfirmer;
pub use console::{ConsoleConfig, GameConsole};
pub use controller::{
    LifecycleController, LifecycleDeps, LifecycleError, LifecycleListener, LifecycleTimings,
    RestartOutcome, StartOutcome, StopOutcome, StopPreference,
};
pub use model::{InstanceState, PlayerSample, RequesterChannel, SampleSource};
pub use monitor::{AutoShutdownMonitor, MonitorSettings, TickOutcome};
pub use notify::{Notifier, StdoutNotifier};
pub use probe::{ProbeError, ProbeTarget, ServerListPing, StatusProbe};
pub use scaleway::{ScalewayBackend, ScalewayBackendError};
pub use shell::{RemoteShell, ShellConfig};
pub use state_store::{FileRequesterStore, MemoryRequesterStore, RequesterStore};
pub use status::{StatusAggregator, StatusReport};
