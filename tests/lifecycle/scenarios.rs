//! BDD scenarios for the lifecycle controller.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Start a stopped server for a requester"
)]
fn scenario_start_stopped_server(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Stop an idle server after three empty samples"
)]
fn scenario_idle_shutdown(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Refuse to deallocate when the stop cannot be confirmed"
)]
fn scenario_unconfirmed_stop(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
