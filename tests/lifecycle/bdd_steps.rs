//! BDD step definitions for start, stop, and automatic shutdown.

use std::sync::Arc;

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use warden::{
    InstanceState, LifecycleError, MonitorSettings, RequesterChannel, RequesterStore,
    StartOutcome, TickOutcome, Warden,
};

use super::test_helpers::{EMPTY_SERVER, LifecycleContext, SESSION_PROBE, player_list};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("step setup failed: {0}")]
    Setup(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Setup(err.to_string()))
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[given("a running instance with both channels")]
fn running_instance(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.harness.compute.set_running(true);
    lifecycle_context
}

#[given("a stopped instance with both channels")]
fn stopped_instance(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.harness.compute.set_running(false);
    lifecycle_context
}

#[given("the console reports \"{count}\" players online")]
fn console_reports_players(lifecycle_context: LifecycleContext, count: u32) -> LifecycleContext {
    lifecycle_context
        .harness
        .console
        .respond_to("list", &player_list(count));
    lifecycle_context
}

#[given("the server is empty")]
fn server_is_empty(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.harness.console.respond_to("list", EMPTY_SERVER);
    lifecycle_context
}

#[given("the game session exits when stopped")]
fn session_exits(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
        .harness
        .shell
        .respond_to(SESSION_PROBE, "session-absent\n");
    lifecycle_context
}

#[given("the game session never exits")]
fn session_never_exits(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
        .harness
        .shell
        .respond_to(SESSION_PROBE, "session-present\n");
    lifecycle_context
}

#[given("\"{channel}\" requested the last start")]
fn requester_recorded(
    lifecycle_context: LifecycleContext,
    channel: String,
) -> Result<LifecycleContext, StepError> {
    lifecycle_context
        .harness
        .store
        .save(&RequesterChannel::new(channel))
        .map_err(|err| StepError::Setup(err.to_string()))?;
    Ok(lifecycle_context)
}

#[when("\"{requester}\" starts the server")]
fn start_server(
    mut lifecycle_context: LifecycleContext,
    requester: String,
) -> Result<LifecycleContext, StepError> {
    let runtime = runtime()?;
    let controller = Arc::clone(&lifecycle_context.harness.controller);
    let outcome =
        runtime.block_on(async move { controller.start(RequesterChannel::new(requester)).await });
    lifecycle_context.start = Some(outcome);
    Ok(lifecycle_context)
}

#[when("the server is stopped")]
fn stop_server(mut lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let runtime = runtime()?;
    let controller = Arc::clone(&lifecycle_context.harness.controller);
    let outcome = runtime.block_on(async move { controller.stop().await });
    lifecycle_context.stop = Some(outcome);
    Ok(lifecycle_context)
}

#[when("the idle monitor samples \"{count}\" times")]
fn monitor_samples(
    mut lifecycle_context: LifecycleContext,
    count: u32,
) -> Result<LifecycleContext, StepError> {
    let runtime = runtime()?;
    let warden = Warden::with_controller(
        Arc::clone(&lifecycle_context.harness.controller),
        MonitorSettings::default(),
    );
    let ticks = runtime.block_on(async {
        let mut ticks = Vec::new();
        for _ in 0..count {
            ticks.push(warden.monitor().tick().await);
        }
        ticks
    });
    lifecycle_context.ticks = ticks;
    Ok(lifecycle_context)
}

#[then("the start reports the game running")]
fn start_reports_running(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match &lifecycle_context.start {
        Some(Ok(StartOutcome::Running(report))) => check(
            report.state == InstanceState::Running,
            || format!("expected a running report, got {report:?}"),
        ),
        other => Err(StepError::Assertion(format!(
            "expected the game running, got {other:?}"
        ))),
    }
}

#[then("the instance is powered on")]
fn instance_powered_on(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let compute = &lifecycle_context.harness.compute;
    check(compute.is_powered(), || String::from("instance should be powered on"))?;
    check(compute.start_calls() == 1, || {
        format!("expected one start call, got {}", compute.start_calls())
    })
}

#[then("the game was launched once")]
fn game_launched_once(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let launches = lifecycle_context
        .harness
        .shell
        .count_matching("screen -dmS minecraft");
    check(launches == 1, || format!("expected one launch, got {launches}"))
}

#[then("the requester \"{channel}\" is remembered")]
fn requester_remembered(
    lifecycle_context: &LifecycleContext,
    channel: String,
) -> Result<(), StepError> {
    let stored = lifecycle_context
        .harness
        .store
        .load()
        .map_err(|err| StepError::Setup(err.to_string()))?;
    check(stored == Some(RequesterChannel::new(channel.as_str())), || {
        format!("expected {channel} to be remembered, got {stored:?}")
    })
}

#[then("a notification mentions \"{text}\"")]
fn notification_mentions(lifecycle_context: &LifecycleContext, text: String) -> Result<(), StepError> {
    check(lifecycle_context.harness.notifier.saw(&text), || {
        format!(
            "no notification mentions {text:?}: {:?}",
            lifecycle_context.harness.notifications()
        )
    })
}

#[then("every notification went to \"{channel}\"")]
fn notifications_addressed(
    lifecycle_context: &LifecycleContext,
    channel: String,
) -> Result<(), StepError> {
    let messages = lifecycle_context.harness.notifier.messages();
    check(!messages.is_empty(), || String::from("no notifications were sent"))?;
    check(messages.iter().all(|(target, _)| *target == channel), || {
        format!("expected every notification to go to {channel}: {messages:?}")
    })
}

#[then("the last sample triggered a shutdown")]
fn last_sample_triggered(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let last = lifecycle_context.ticks.last();
    check(
        last == Some(&TickOutcome::ShutdownTriggered { stopped: true }),
        || format!("expected a shutdown on the last sample, got {:?}", lifecycle_context.ticks),
    )
}

#[then("the instance is deallocated once")]
fn instance_deallocated(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let compute = &lifecycle_context.harness.compute;
    check(!compute.is_powered(), || String::from("instance should be off"))?;
    check(compute.stop_calls() == 1, || {
        format!("expected one stop call, got {}", compute.stop_calls())
    })
}

#[then("the stop fails for lack of confirmation")]
fn stop_unconfirmed(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match &lifecycle_context.stop {
        Some(Err(LifecycleError::ConfirmationFailed { .. })) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected an unconfirmed stop, got {other:?}"
        ))),
    }
}

#[then("the instance was never deallocated")]
fn instance_kept(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let compute = &lifecycle_context.harness.compute;
    check(compute.is_powered(), || String::from("instance should still be on"))?;
    check(compute.stop_calls() == 0, || {
        format!("expected no stop calls, got {}", compute.stop_calls())
    })
}
