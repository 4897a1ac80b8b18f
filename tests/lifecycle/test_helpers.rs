//! Shared fixtures for lifecycle BDD scenarios.

use rstest::fixture;
use warden::test_support::ControllerHarness;
use warden::{LifecycleError, StartOutcome, StopOutcome, TickOutcome};

/// Command that lists the `screen` sessions on the host.
pub const SESSION_PROBE: &str = "screen -list";

/// Console reply for a server with nobody online.
pub const EMPTY_SERVER: &str = "There are 0 of a max of 20 players online:";

#[derive(Clone)]
pub struct LifecycleContext {
    pub harness: ControllerHarness,
    pub start: Option<Result<StartOutcome, LifecycleError>>,
    pub stop: Option<Result<StopOutcome, LifecycleError>>,
    pub ticks: Vec<TickOutcome>,
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext {
        harness: ControllerHarness::running_with_both_channels(),
        start: None,
        stop: None,
        ticks: Vec::new(),
    }
}

/// Console reply listing `count` named players.
pub fn player_list(count: u32) -> String {
    let names = (1..=count)
        .map(|index| format!("player{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("There are {count} of a max of 20 players online: {names}")
}
