//! Power state planning and waiting for the Scaleway backend.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use super::types::{Action, InstanceId, ServerState};
use super::{ScalewayBackend, ScalewayBackendError, Target};

/// Provider state and permitted actions at one point in time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InstanceSnapshot {
    pub(crate) state: ServerState,
    pub(crate) allowed_actions: Vec<Action>,
}

/// Desired power state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Power {
    On,
    Off,
}

impl Power {
    const fn action(self) -> &'static str {
        match self {
            Self::On => "poweron",
            Self::Off => "poweroff",
        }
    }

    const fn target_state(self) -> &'static str {
        match self {
            Self::On => "running",
            Self::Off => "stopped",
        }
    }

    const fn transitional_state(self) -> &'static str {
        match self {
            Self::On => "starting",
            Self::Off => "stopping",
        }
    }
}

/// What has to happen to reach the desired power state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum PowerPlan {
    /// Already in the desired state.
    Settled,
    /// The provider is already moving there; only wait.
    Await,
    /// Ask the provider to perform this action, then wait.
    Perform(Action),
}

pub(crate) fn plan(
    power: Power,
    snapshot: &InstanceSnapshot,
    instance_id: &InstanceId,
) -> Result<PowerPlan, ScalewayBackendError> {
    let state = snapshot.state.as_str();
    if state == power.target_state() {
        return Ok(PowerPlan::Settled);
    }
    if state == power.transitional_state() {
        return Ok(PowerPlan::Await);
    }
    if snapshot
        .allowed_actions
        .iter()
        .any(|action| action.as_str() == power.action())
    {
        return Ok(PowerPlan::Perform(Action::from(power.action())));
    }
    Err(ScalewayBackendError::ActionNotAllowed {
        instance_id: instance_id.as_str().to_owned(),
        state: state.to_owned(),
        action: power.action().to_owned(),
    })
}

impl ScalewayBackend {
    pub(super) async fn fetch_snapshot(
        &self,
        target: &Target,
    ) -> Result<InstanceSnapshot, ScalewayBackendError> {
        let mut servers = target
            .api
            .list_instances(target.zone.as_str())
            .servers(target.instance_id.as_str())
            .per_page(1)
            .run_async()
            .await?;

        let server = servers
            .pop()
            .ok_or_else(|| ScalewayBackendError::InstanceNotFound {
                instance_id: target.instance_id.as_str().to_owned(),
                zone: target.zone.as_str().to_owned(),
            })?;
        Ok(InstanceSnapshot {
            state: server.state.into(),
            allowed_actions: server
                .allowed_actions
                .into_iter()
                .map(Action::from)
                .collect(),
        })
    }

    pub(super) async fn drive(&self, power: Power) -> Result<(), ScalewayBackendError> {
        let target = self.target()?;
        let snapshot = self.fetch_snapshot(target).await?;
        match plan(power, &snapshot, &target.instance_id)? {
            PowerPlan::Settled => {
                debug!(instance = %target.instance_id, state = %snapshot.state, "already settled");
                return Ok(());
            }
            PowerPlan::Await => {}
            PowerPlan::Perform(action) => {
                info!(instance = %target.instance_id, %action, "requesting power action");
                target
                    .api
                    .perform_instance_action_async(
                        target.zone.as_str(),
                        target.instance_id.as_str(),
                        action.as_str(),
                    )
                    .await?;
            }
        }
        self.wait_for(target, power).await
    }

    async fn wait_for(&self, target: &Target, power: Power) -> Result<(), ScalewayBackendError> {
        let deadline = Instant::now() + self.wait_timeout;
        while Instant::now() <= deadline {
            let snapshot = self.fetch_snapshot(target).await?;
            if snapshot.state.as_str() == power.target_state() {
                info!(instance = %target.instance_id, state = %snapshot.state, "instance settled");
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }

        Err(ScalewayBackendError::Timeout {
            instance_id: target.instance_id.as_str().to_owned(),
            target: power.target_state().to_owned(),
        })
    }
}

/// Default pause between provider polls.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default limit for a power transition.
pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_secs(300);
