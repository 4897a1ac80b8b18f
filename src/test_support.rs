//! Test support utilities shared across unit and integration tests.
//!
//! Every fake here is cheap to clone or share through `Arc`, records what
//! was asked of it, and answers from a script so lifecycle sequences can be
//! driven deterministically without SSH, RCON, or a cloud account.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::channel::{ChannelError, ChannelFuture, ChannelKind, CommandChannel, CommandResult};
use crate::compute::{ComputeBackend, ComputeError, ComputeFuture, ComputeStatus};
use crate::controller::{LifecycleController, LifecycleDeps, LifecycleTimings};
use crate::model::RequesterChannel;
use crate::notify::{Notifier, NotifyFuture};
use crate::probe::{ProbeError, ProbeFuture, ProbeStatus, StatusProbe};
use crate::shell::{CommandOutput, CommandRunner, GameScripts, RunnerError, RunnerFuture, ShellConfig};
use crate::state_store::{MemoryRequesterStore, RequesterStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// An empty queue yields a spawn error.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a> {
        Box::pin(async move {
            lock(&self.invocations).push(CommandInvocation {
                program: program.to_owned(),
                args: args.to_vec(),
            });
            lock(&self.responses)
                .pop_front()
                .ok_or_else(|| RunnerError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
        })
    }
}

#[derive(Clone, Debug)]
enum Reply {
    Output(String),
    Rejected(String),
    Broken(String),
}

#[derive(Clone, Debug)]
struct Rule {
    pattern: String,
    reply: Reply,
}

/// Command channel answering from pattern rules.
///
/// One-shot rules are consulted first, oldest first; then the most recently
/// added persistent rule whose pattern is a substring of the command. A
/// command matching nothing succeeds with empty output.
#[derive(Debug)]
pub struct ScriptedChannel {
    kind: ChannelKind,
    available: AtomicBool,
    persistent: Mutex<Vec<Rule>>,
    once: Mutex<VecDeque<Rule>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    fn build(kind: ChannelKind, available: bool) -> Self {
        Self {
            kind,
            available: AtomicBool::new(available),
            persistent: Mutex::new(Vec::new()),
            once: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// A channel that accepts commands.
    #[must_use]
    pub fn available(kind: ChannelKind) -> Self {
        Self::build(kind, true)
    }

    /// A channel that reports itself unavailable and refuses commands.
    #[must_use]
    pub fn unavailable(kind: ChannelKind) -> Self {
        Self::build(kind, false)
    }

    /// Flips availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Answers every command containing `pattern` with `output`.
    pub fn respond_to(&self, pattern: &str, output: &str) {
        self.push_rule(pattern, Reply::Output(output.to_owned()));
    }

    /// Answers the next command containing `pattern` with `output`.
    pub fn respond_once(&self, pattern: &str, output: &str) {
        lock(&self.once).push_back(Rule {
            pattern: pattern.to_owned(),
            reply: Reply::Output(output.to_owned()),
        });
    }

    /// Commands containing `pattern` run but report failure.
    pub fn reject(&self, pattern: &str, reason: &str) {
        self.push_rule(pattern, Reply::Rejected(reason.to_owned()));
    }

    /// Commands containing `pattern` fail in transport.
    pub fn fail_on(&self, pattern: &str) {
        self.push_rule(pattern, Reply::Broken(format!("scripted failure for '{pattern}'")));
    }

    /// Returns every command executed so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Counts executed commands containing `pattern`.
    #[must_use]
    pub fn count_matching(&self, pattern: &str) -> usize {
        lock(&self.commands)
            .iter()
            .filter(|command| command.contains(pattern))
            .count()
    }

    fn push_rule(&self, pattern: &str, reply: Reply) {
        lock(&self.persistent).push(Rule {
            pattern: pattern.to_owned(),
            reply,
        });
    }

    fn reply_for(&self, command: &str) -> Option<Reply> {
        {
            let mut once = lock(&self.once);
            if let Some(position) = once.iter().position(|rule| command.contains(&rule.pattern)) {
                return once.remove(position).map(|rule| rule.reply);
            }
        }
        lock(&self.persistent)
            .iter()
            .rev()
            .find(|rule| command.contains(&rule.pattern))
            .map(|rule| rule.reply.clone())
    }
}

impl CommandChannel for ScriptedChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn execute<'a>(&'a self, command: &'a str, _timeout: Duration) -> ChannelFuture<'a> {
        Box::pin(async move {
            if !self.is_available() {
                return Err(ChannelError::Unavailable {
                    channel: self.kind,
                    reason: String::from("scripted channel is unavailable"),
                });
            }
            lock(&self.commands).push(command.to_owned());
            match self.reply_for(command) {
                None => Ok(CommandResult::success(self.kind, "")),
                Some(Reply::Output(output)) => Ok(CommandResult::success(self.kind, output)),
                Some(Reply::Rejected(reason)) => {
                    Ok(CommandResult::failure(self.kind, "", reason))
                }
                Some(Reply::Broken(message)) => Err(ChannelError::Failed {
                    channel: self.kind,
                    message,
                }),
            }
        })
    }
}

/// Player cap reported by [`ScriptedProbe`].
pub const SCRIPTED_MAX_PLAYERS: u32 = 20;

/// Status probe answering from a queue, then a fallback.
///
/// `Some(players)` answers online with that many players; `None` fails as
/// unreachable.
#[derive(Debug)]
pub struct ScriptedProbe {
    configured: bool,
    fallback: Mutex<Option<u32>>,
    queue: Mutex<VecDeque<Option<u32>>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    fn build(configured: bool, fallback: Option<u32>) -> Self {
        Self {
            configured,
            fallback: Mutex::new(fallback),
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A probe that always finds the server with `players` online.
    #[must_use]
    pub fn online(players: u32) -> Self {
        Self::build(true, Some(players))
    }

    /// A probe that never reaches the server.
    #[must_use]
    pub fn offline() -> Self {
        Self::build(true, None)
    }

    /// A probe with no target.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::build(false, None)
    }

    /// Queues one online answer ahead of the fallback.
    pub fn push_online(&self, players: u32) {
        lock(&self.queue).push_back(Some(players));
    }

    /// Queues one failed answer ahead of the fallback.
    pub fn push_offline(&self) {
        lock(&self.queue).push_back(None);
    }

    /// Replaces the fallback with an online answer.
    pub fn set_online(&self, players: u32) {
        *lock(&self.fallback) = Some(players);
    }

    /// Replaces the fallback with a failed answer.
    pub fn set_offline(&self) {
        *lock(&self.fallback) = None;
    }

    /// Number of probes attempted.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StatusProbe for ScriptedProbe {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn probe(&self, _timeout: Duration) -> ProbeFuture<'_> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.configured {
                return Err(ProbeError::Unconfigured);
            }
            let answer = lock(&self.queue)
                .pop_front()
                .unwrap_or_else(|| *lock(&self.fallback));
            answer
                .map(|online| ProbeStatus {
                    online,
                    max: SCRIPTED_MAX_PLAYERS,
                    version: Some(String::from("1.21")),
                })
                .ok_or_else(|| ProbeError::Unreachable {
                    target: String::from("scripted:25565"),
                    message: String::from("connection refused"),
                })
        })
    }
}

/// In-memory compute backend. Start and stop flip the running flag.
#[derive(Debug)]
pub struct FakeCompute {
    configured: bool,
    running: AtomicBool,
    start_error: Mutex<Option<ComputeError>>,
    stop_error: Mutex<Option<ComputeError>>,
    query_error: Mutex<Option<ComputeError>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
}

impl FakeCompute {
    fn build(configured: bool, running: bool) -> Self {
        Self {
            configured,
            running: AtomicBool::new(running),
            start_error: Mutex::new(None),
            stop_error: Mutex::new(None),
            query_error: Mutex::new(None),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
        }
    }

    /// A configured instance that is powered on.
    #[must_use]
    pub fn running() -> Self {
        Self::build(true, true)
    }

    /// A configured instance that is powered off.
    #[must_use]
    pub fn stopped() -> Self {
        Self::build(true, false)
    }

    /// A backend without credentials; every call fails.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self::build(false, false)
    }

    /// Makes subsequent starts fail with `error`.
    pub fn fail_start(&self, error: ComputeError) {
        *lock(&self.start_error) = Some(error);
    }

    /// Makes subsequent stops fail with `error`.
    pub fn fail_stop(&self, error: ComputeError) {
        *lock(&self.stop_error) = Some(error);
    }

    /// Makes subsequent state queries fail with `error`.
    pub fn fail_queries(&self, error: ComputeError) {
        *lock(&self.query_error) = Some(error);
    }

    /// Forces the running flag.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Whether the instance is currently powered on.
    #[must_use]
    pub fn is_powered(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of start calls.
    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of stop calls.
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn check(&self, injected: &Mutex<Option<ComputeError>>) -> Result<(), ComputeError> {
        if !self.configured {
            return Err(ComputeError::Unconfigured(String::from(
                "set SCW_SECRET_KEY and SCW_INSTANCE_ID",
            )));
        }
        lock(injected).clone().map_or(Ok(()), Err)
    }
}

impl ComputeBackend for FakeCompute {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn start(&self) -> ComputeFuture<'_, ()> {
        Box::pin(async move {
            self.start_calls.fetch_add(1, Ordering::SeqCst);
            self.check(&self.start_error)?;
            self.set_running(true);
            Ok(())
        })
    }

    fn stop(&self) -> ComputeFuture<'_, ()> {
        Box::pin(async move {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            self.check(&self.stop_error)?;
            self.set_running(false);
            Ok(())
        })
    }

    fn is_running(&self) -> ComputeFuture<'_, bool> {
        Box::pin(async move {
            self.check(&self.query_error)?;
            Ok(self.is_powered())
        })
    }

    fn describe(&self) -> ComputeFuture<'_, ComputeStatus> {
        Box::pin(async move {
            self.check(&self.query_error)?;
            let label = if self.is_powered() { "running" } else { "stopped" };
            Ok(ComputeStatus::from_label(label))
        })
    }
}

/// Notifier that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(channel, text)` pairs in delivery order.
    #[must_use]
    pub fn messages(&self) -> Vec<(String, String)> {
        lock(&self.messages).clone()
    }

    /// Returns whether any message contains `needle`.
    #[must_use]
    pub fn saw(&self, needle: &str) -> bool {
        lock(&self.messages)
            .iter()
            .any(|(_, text)| text.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn notify<'a>(&'a self, channel: &'a RequesterChannel, text: &'a str) -> NotifyFuture<'a> {
        Box::pin(async move {
            lock(&self.messages).push((channel.as_str().to_owned(), text.to_owned()));
        })
    }
}

/// Serialises environment mutation across tests in one process.
pub static ENV_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Holds [`ENV_LOCK`] and restores the touched variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: tokio::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets each `(key, value)` pair while holding the global lock.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), std::env::var_os(key)));
            // SAFETY: every mutation happens while `ENV_LOCK` is held.
            unsafe { std::env::set_var(key, value) };
        }
        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: `_guard` still holds `ENV_LOCK`.
            unsafe {
                match old {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}

/// Shell settings for a host that exists only in tests.
#[must_use]
pub fn shell_config() -> ShellConfig {
    ShellConfig {
        ssh_bin: String::from("ssh"),
        ssh_host: Some(String::from("203.0.113.10")),
        ssh_user: String::from("steve"),
        ssh_port: 2222,
        identity_file: Some(String::from("/keys/id_ed25519")),
        batch_mode: true,
        strict_host_key_checking: false,
        known_hosts_file: String::from("/dev/null"),
        connect_timeout_secs: 10,
        session_name: String::from("minecraft"),
        server_dir: String::from("~/minecraft"),
        launch_command: String::from("./run.sh"),
    }
}

/// Millisecond-scale timings so sequences finish quickly.
#[must_use]
pub const fn fast_timings() -> LifecycleTimings {
    LifecycleTimings {
        boot_grace: Duration::from_millis(20),
        start_timeout: Duration::from_millis(100),
        start_poll_interval: Duration::from_millis(5),
        max_wait: Duration::from_millis(120),
        poll_interval: Duration::from_millis(5),
        command_timeout: Duration::from_secs(1),
        probe_timeout: Duration::from_secs(1),
    }
}

/// A controller wired to fakes, with handles to each fake. Clones share
/// the same fakes and controller.
#[derive(Clone)]
pub struct ControllerHarness {
    /// Compute fake.
    pub compute: Arc<FakeCompute>,
    /// Remote shell fake.
    pub shell: Arc<ScriptedChannel>,
    /// Game console fake.
    pub console: Arc<ScriptedChannel>,
    /// Status probe fake.
    pub probe: Arc<ScriptedProbe>,
    /// Requester store.
    pub store: Arc<MemoryRequesterStore>,
    /// Notification recorder.
    pub notifier: Arc<RecordingNotifier>,
    /// Controller under test.
    pub controller: Arc<LifecycleController>,
}

impl ControllerHarness {
    /// Wires a controller with [`fast_timings`].
    #[must_use]
    pub fn new(
        compute: FakeCompute,
        shell: ScriptedChannel,
        console: ScriptedChannel,
        probe: ScriptedProbe,
    ) -> Self {
        Self::with_timings(compute, shell, console, probe, fast_timings())
    }

    /// Wires a controller with explicit timings.
    #[must_use]
    pub fn with_timings(
        compute: FakeCompute,
        shell: ScriptedChannel,
        console: ScriptedChannel,
        probe: ScriptedProbe,
        timings: LifecycleTimings,
    ) -> Self {
        let compute = Arc::new(compute);
        let shell = Arc::new(shell);
        let console = Arc::new(console);
        let probe = Arc::new(probe);
        let store = Arc::new(MemoryRequesterStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let deps = LifecycleDeps {
            compute: Arc::clone(&compute) as Arc<dyn ComputeBackend>,
            shell: Arc::clone(&shell) as Arc<dyn CommandChannel>,
            console: Arc::clone(&console) as Arc<dyn CommandChannel>,
            probe: Arc::clone(&probe) as Arc<dyn StatusProbe>,
            store: Arc::clone(&store) as Arc<dyn RequesterStore>,
            notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
            scripts: GameScripts::new(&shell_config(), "stop"),
        };
        let controller = Arc::new(LifecycleController::new(deps, timings));
        Self {
            compute,
            shell,
            console,
            probe,
            store,
            notifier,
            controller,
        }
    }

    /// A running instance with both channels available and the game
    /// answering the probe with nobody online.
    #[must_use]
    pub fn running_with_both_channels() -> Self {
        Self::new(
            FakeCompute::running(),
            ScriptedChannel::available(ChannelKind::RemoteShell),
            ScriptedChannel::available(ChannelKind::GameConsole),
            ScriptedProbe::online(0),
        )
    }

    /// Texts of every notification sent so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<String> {
        self.notifier
            .messages()
            .into_iter()
            .map(|(_, text)| text)
            .collect()
    }
}
