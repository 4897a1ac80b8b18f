//! Tests for the Scaleway backend's planning and configuration handling.

use rstest::rstest;

use super::power::{InstanceSnapshot, Power, PowerPlan, plan};
use super::types::{Action, InstanceId};
use super::*;

fn snapshot(state: &str, allowed: &[&str]) -> InstanceSnapshot {
    InstanceSnapshot {
        state: state.into(),
        allowed_actions: allowed.iter().map(|action| Action::from(*action)).collect(),
    }
}

fn instance() -> InstanceId {
    InstanceId::from("srv-1")
}

fn config() -> ComputeConfig {
    ComputeConfig {
        access_key: None,
        secret_key: Some(String::from("dummy")),
        default_zone: String::from("fr-par-1"),
        instance_id: Some(String::from("srv-1")),
    }
}

#[rstest]
#[case::running_on(Power::On, "running", &[], PowerPlan::Settled)]
#[case::stopped_off(Power::Off, "stopped", &[], PowerPlan::Settled)]
#[case::starting_on(Power::On, "starting", &[], PowerPlan::Await)]
#[case::stopping_off(Power::Off, "stopping", &[], PowerPlan::Await)]
#[case::power_on(Power::On, "stopped", &["poweron", "backup"], PowerPlan::Perform(Action::from("poweron")))]
#[case::power_off(Power::Off, "running", &["poweroff", "reboot"], PowerPlan::Perform(Action::from("poweroff")))]
#[case::off_from_in_place(Power::Off, "stopped in place", &["poweron", "poweroff"], PowerPlan::Perform(Action::from("poweroff")))]
fn plans_follow_state_and_allowed_actions(
    #[case] power: Power,
    #[case] state: &str,
    #[case] allowed: &[&str],
    #[case] expected: PowerPlan,
) {
    let result = plan(power, &snapshot(state, allowed), &instance());
    assert_eq!(result, Ok(expected));
}

#[test]
fn disallowed_action_is_reported() {
    let err = plan(Power::On, &snapshot("locked", &["backup"]), &instance())
        .expect_err("locked instance cannot power on");

    assert_eq!(
        err,
        ScalewayBackendError::ActionNotAllowed {
            instance_id: String::from("srv-1"),
            state: String::from("locked"),
            action: String::from("poweron"),
        }
    );
}

#[test]
fn complete_config_is_configured() {
    assert!(ScalewayBackend::new(&config()).is_configured());
}

#[rstest]
#[case::no_secret(ComputeConfig { secret_key: None, ..config() }, "SCW_SECRET_KEY")]
#[case::no_instance(ComputeConfig { instance_id: None, ..config() }, "SCW_INSTANCE_ID")]
#[tokio::test]
async fn incomplete_config_fails_every_operation(
    #[case] incomplete: ComputeConfig,
    #[case] env_var: &str,
) {
    let backend = ScalewayBackend::new(&incomplete);
    assert!(!backend.is_configured());

    for result in [
        backend.start().await,
        backend.stop().await,
        backend.is_running().await.map(|_| ()),
        backend.describe().await.map(|_| ()),
    ] {
        let Err(ComputeError::Unconfigured(reason)) = result else {
            panic!("expected Unconfigured, got {result:?}");
        };
        assert!(reason.contains(env_var), "{reason}");
    }
}

#[test]
fn provider_errors_map_onto_compute_errors() {
    let timeout = ScalewayBackendError::Timeout {
        instance_id: String::from("srv-1"),
        target: String::from("stopped"),
    };
    assert_eq!(
        ComputeError::from(timeout),
        ComputeError::Timeout {
            instance_id: String::from("srv-1"),
            target: String::from("stopped"),
        }
    );

    let missing = ScalewayBackendError::InstanceNotFound {
        instance_id: String::from("srv-1"),
        zone: String::from("fr-par-1"),
    };
    assert!(matches!(ComputeError::from(missing), ComputeError::Provider(_)));
}
