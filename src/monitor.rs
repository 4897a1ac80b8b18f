//! Automatic shutdown of an idle server.
//!
//! The monitor samples the player count on a fixed interval while the
//! instance runs. A streak of consecutive empty samples reaching the
//! threshold triggers one graceful stop through the controller. Any player
//! resets the streak; a sample that could not be taken leaves it alone.
//!
//! The schedule is started and halted by controller transitions, delivered
//! through [`LifecycleListener`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::controller::{LifecycleController, LifecycleListener, StopPreference};

/// Tuning for [`AutoShutdownMonitor`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MonitorSettings {
    /// Pause between samples.
    pub interval: Duration,
    /// Consecutive empty samples that trigger a stop.
    pub threshold: u32,
    /// Channel order for the graceful stop.
    pub stop_preference: StopPreference,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            threshold: 3,
            stop_preference: StopPreference::ConsoleFirst,
        }
    }
}

/// What one sample led to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    /// The instance is not running; the schedule was halted.
    NotRunning,
    /// A lifecycle operation is in flight; nothing was sampled.
    Deferred,
    /// No sample could be taken; the streak is unchanged.
    Unknown,
    /// Players are online; the streak was reset.
    Active {
        /// Players seen.
        players: u32,
    },
    /// The server is empty but the threshold is not reached yet.
    Empty {
        /// Consecutive empty samples so far.
        streak: u32,
    },
    /// The threshold was reached and a stop was attempted.
    ShutdownTriggered {
        /// Whether the stop succeeded.
        stopped: bool,
    },
}

struct Schedule {
    task: JoinHandle<()>,
    halt: Arc<Notify>,
}

/// Stops the server after a run of empty samples.
pub struct AutoShutdownMonitor {
    controller: Arc<LifecycleController>,
    settings: MonitorSettings,
    streak: Mutex<u32>,
    serial: tokio::sync::Mutex<()>,
    schedule: Mutex<Option<Schedule>>,
    this: Weak<Self>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AutoShutdownMonitor {
    /// Builds an idle monitor; call [`AutoShutdownMonitor::start`] or attach
    /// it to the controller as a listener to schedule it.
    #[must_use]
    pub fn new(controller: Arc<LifecycleController>, settings: MonitorSettings) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            controller,
            settings,
            streak: Mutex::new(0),
            serial: tokio::sync::Mutex::new(()),
            schedule: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Consecutive empty samples so far.
    #[must_use]
    pub fn streak(&self) -> u32 {
        *lock(&self.streak)
    }

    /// Whether a sampling task is live.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        lock(&self.schedule)
            .as_ref()
            .is_some_and(|schedule| !schedule.task.is_finished())
    }

    /// Schedules periodic sampling. Does nothing when already scheduled or
    /// when called outside a tokio runtime.
    pub fn start(&self) {
        let mut schedule = lock(&self.schedule);
        if schedule.as_ref().is_some_and(|current| !current.task.is_finished()) {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("no async runtime; automatic shutdown not scheduled");
            return;
        };

        let halt = Arc::new(Notify::new());
        let signal = Arc::clone(&halt);
        let monitor = self.this.clone();
        let interval = self.settings.interval;
        let task = runtime.spawn(async move {
            loop {
                tokio::select! {
                    () = signal.notified() => break,
                    () = sleep(interval) => {}
                }
                let Some(live) = monitor.upgrade() else {
                    break;
                };
                let outcome = live.tick().await;
                debug!(?outcome, "automatic shutdown sample");
            }
        });
        *schedule = Some(Schedule { task, halt });
        info!(?interval, threshold = self.settings.threshold, "automatic shutdown scheduled");
    }

    /// Cancels the schedule and clears the streak. A tick already running
    /// finishes first.
    pub fn halt(&self) {
        if let Some(schedule) = lock(&self.schedule).take() {
            schedule.halt.notify_one();
            info!("automatic shutdown halted");
        }
        *lock(&self.streak) = 0;
    }

    /// Halts the schedule, then waits for the sampling task to exit. A tick
    /// in progress, including any shutdown it triggered, runs to completion.
    pub async fn drain(&self) {
        let schedule = lock(&self.schedule).take();
        *lock(&self.streak) = 0;
        let Some(Schedule { task, halt }) = schedule else {
            return;
        };
        halt.notify_one();
        if let Err(err) = task.await {
            warn!(%err, "automatic shutdown task ended abnormally");
        }
        info!("automatic shutdown drained");
    }

    /// Takes one sample and acts on it.
    pub async fn tick(&self) -> TickOutcome {
        let _serial = self.serial.lock().await;

        if self.controller.in_flight().is_some() {
            return TickOutcome::Deferred;
        }
        match self.controller.compute_running().await {
            Ok(true) => {}
            Ok(false) => {
                self.halt();
                return TickOutcome::NotRunning;
            }
            Err(err) => {
                warn!(%err, "instance state unknown; sample skipped");
                return TickOutcome::Unknown;
            }
        }

        let Some(sample) = self.controller.sample_players().await else {
            debug!(streak = self.streak(), "no player sample available");
            return TickOutcome::Unknown;
        };
        if !sample.is_empty() {
            *lock(&self.streak) = 0;
            return TickOutcome::Active {
                players: sample.count,
            };
        }

        let streak = {
            let mut guard = lock(&self.streak);
            *guard = guard.saturating_add(1);
            *guard
        };
        info!(streak, threshold = self.settings.threshold, source = %sample.source, "server empty");
        if streak < self.settings.threshold {
            return TickOutcome::Empty { streak };
        }

        *lock(&self.streak) = 0;
        self.shut_down(streak).await
    }

    async fn shut_down(&self, streak: u32) -> TickOutcome {
        let minutes = self
            .settings
            .interval
            .as_secs()
            .saturating_mul(u64::from(streak))
            .div_ceil(60);
        self.controller
            .notify_requester(&format!(
                "No players for {streak} consecutive checks (about {minutes} min); stopping the server."
            ))
            .await;

        match self.controller.stop_with(self.settings.stop_preference).await {
            Ok(outcome) => {
                info!(%outcome, "automatic shutdown finished");
                TickOutcome::ShutdownTriggered { stopped: true }
            }
            Err(err) => {
                warn!(%err, "automatic shutdown failed");
                self.controller
                    .notify_requester(&format!("Automatic shutdown failed: {err}"))
                    .await;
                TickOutcome::ShutdownTriggered { stopped: false }
            }
        }
    }
}

impl LifecycleListener for AutoShutdownMonitor {
    fn on_running(&self) {
        self.start();
    }

    fn on_stopped(&self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::model::RequesterChannel;
    use crate::state_store::RequesterStore;
    use crate::test_support::{
        ControllerHarness, FakeCompute, ScriptedChannel, ScriptedProbe, fast_timings,
    };

    const EMPTY: &str = "There are 0 of a max of 20 players online:";
    const TWO: &str = "There are 2 of a max of 20 players online: alex, sam";

    fn settings(threshold: u32) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_millis(10),
            threshold,
            stop_preference: StopPreference::ConsoleFirst,
        }
    }

    fn idle_harness() -> ControllerHarness {
        let harness = ControllerHarness::running_with_both_channels();
        harness.console.respond_to("list", EMPTY);
        harness.shell.respond_to("screen -list", "session-absent\n");
        harness
            .store
            .save(&RequesterChannel::from("chan-ops"))
            .unwrap_or_else(|err| panic!("seed: {err}"));
        harness
    }

    #[tokio::test]
    async fn threshold_of_empty_samples_stops_once() {
        let harness = idle_harness();
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(3));

        assert_eq!(monitor.tick().await, TickOutcome::Empty { streak: 1 });
        assert_eq!(monitor.tick().await, TickOutcome::Empty { streak: 2 });
        assert_eq!(harness.compute.stop_calls(), 0);
        assert_eq!(
            monitor.tick().await,
            TickOutcome::ShutdownTriggered { stopped: true }
        );

        assert_eq!(harness.compute.stop_calls(), 1);
        assert_eq!(monitor.streak(), 0);
        assert!(harness.notifier.saw("No players for 3 consecutive checks"));
        assert_eq!(monitor.tick().await, TickOutcome::NotRunning);
        assert_eq!(harness.compute.stop_calls(), 1);
    }

    #[tokio::test]
    async fn any_player_resets_the_streak() {
        let harness = idle_harness();
        harness.console.respond_once("list", EMPTY);
        harness.console.respond_once("list", EMPTY);
        harness.console.respond_to("list", TWO);
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(3));

        monitor.tick().await;
        assert_eq!(monitor.tick().await, TickOutcome::Empty { streak: 2 });
        assert_eq!(monitor.tick().await, TickOutcome::Active { players: 2 });

        assert_eq!(monitor.streak(), 0);
        assert_eq!(harness.compute.stop_calls(), 0);
    }

    #[tokio::test]
    async fn missing_sample_leaves_streak_alone() {
        let harness = ControllerHarness::new(
            FakeCompute::running(),
            ScriptedChannel::available(ChannelKind::RemoteShell),
            ScriptedChannel::unavailable(ChannelKind::GameConsole),
            ScriptedProbe::offline(),
        );
        harness.probe.push_online(0);
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(2));

        assert_eq!(monitor.tick().await, TickOutcome::Empty { streak: 1 });
        assert_eq!(monitor.tick().await, TickOutcome::Unknown);
        assert_eq!(monitor.streak(), 1);
    }

    #[tokio::test]
    async fn stopped_instance_halts_the_schedule() {
        let harness = ControllerHarness::new(
            FakeCompute::stopped(),
            ScriptedChannel::available(ChannelKind::RemoteShell),
            ScriptedChannel::available(ChannelKind::GameConsole),
            ScriptedProbe::offline(),
        );
        let monitor = AutoShutdownMonitor::new(
            Arc::clone(&harness.controller),
            MonitorSettings {
                interval: Duration::from_secs(60),
                ..settings(3)
            },
        );

        monitor.start();
        assert!(monitor.is_scheduled());
        assert_eq!(monitor.tick().await, TickOutcome::NotRunning);
        assert!(!monitor.is_scheduled());
        assert!(harness.console.commands().is_empty());
    }

    #[tokio::test]
    async fn failed_automatic_stop_is_reported() {
        let harness = idle_harness();
        harness.shell.respond_to("screen -list", "session-present\n");
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(1));

        assert_eq!(
            monitor.tick().await,
            TickOutcome::ShutdownTriggered { stopped: false }
        );
        assert!(harness.compute.is_powered());
        assert!(harness.notifier.saw("Automatic shutdown failed"));
    }

    #[tokio::test]
    async fn shell_preference_is_honoured() {
        let harness = idle_harness();
        let monitor = AutoShutdownMonitor::new(
            Arc::clone(&harness.controller),
            MonitorSettings {
                stop_preference: StopPreference::ShellFirst,
                ..settings(1)
            },
        );

        monitor.tick().await;

        assert_eq!(harness.console.count_matching("stop"), 0);
        assert_eq!(harness.shell.count_matching("-X stuff"), 1);
    }

    #[tokio::test]
    async fn sampling_waits_for_in_flight_operations() {
        let mut timings = fast_timings();
        timings.boot_grace = Duration::from_millis(300);
        let harness = ControllerHarness::with_timings(
            FakeCompute::stopped(),
            ScriptedChannel::available(ChannelKind::RemoteShell),
            ScriptedChannel::available(ChannelKind::GameConsole),
            ScriptedProbe::online(0),
            timings,
        );
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(1));
        let controller = Arc::clone(&harness.controller);
        let start =
            tokio::spawn(async move { controller.start(RequesterChannel::from("chan-ops")).await });

        sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.tick().await, TickOutcome::Deferred);

        assert!(start.await.is_ok());
        assert_eq!(harness.compute.stop_calls(), 0);
    }

    #[tokio::test]
    async fn drain_waits_for_a_shutdown_in_progress() {
        let mut timings = fast_timings();
        timings.poll_interval = Duration::from_millis(40);
        timings.max_wait = Duration::from_secs(2);
        let harness = ControllerHarness::with_timings(
            FakeCompute::running(),
            ScriptedChannel::available(ChannelKind::RemoteShell),
            ScriptedChannel::available(ChannelKind::GameConsole),
            ScriptedProbe::online(0),
            timings,
        );
        harness.console.respond_to("list", EMPTY);
        harness.shell.respond_once("screen -list", "session-present\n");
        harness.shell.respond_once("screen -list", "session-present\n");
        harness.shell.respond_to("screen -list", "session-absent\n");
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(1));

        monitor.start();
        for _ in 0..500 {
            if harness.controller.in_flight().is_some() {
                break;
            }
            sleep(Duration::from_millis(2)).await;
        }
        monitor.drain().await;

        assert!(!monitor.is_scheduled());
        assert!(harness.controller.in_flight().is_none());
        assert_eq!(harness.compute.stop_calls(), 1);
        assert!(!harness.compute.is_powered());
    }

    #[tokio::test]
    async fn scheduled_monitor_stops_idle_server_and_halts() {
        let harness = idle_harness();
        let monitor = AutoShutdownMonitor::new(Arc::clone(&harness.controller), settings(2));
        harness.controller.attach_listener(&monitor);

        monitor.start();
        for _ in 0..200 {
            if !harness.compute.is_powered() && !monitor.is_scheduled() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        assert!(!harness.compute.is_powered());
        assert_eq!(harness.compute.stop_calls(), 1);
        assert!(!monitor.is_scheduled());
    }
}
