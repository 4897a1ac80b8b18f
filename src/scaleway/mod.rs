//! Scaleway backend for the instance hosting the game server.
//!
//! The instance is powered on with `poweron` and deallocated with `poweroff`.
//! State is always read from the Instances API; nothing is cached.

mod error;
mod power;
mod types;

use std::time::Duration;

use scaleway_rs::ScalewayApi;

use crate::compute::{ComputeBackend, ComputeError, ComputeFuture, ComputeStatus};
use crate::config::ComputeConfig;
use power::Power;
use types::{InstanceId, Zone};

pub use error::ScalewayBackendError;

#[derive(Clone)]
pub(crate) struct Target {
    api: ScalewayApi,
    zone: Zone,
    instance_id: InstanceId,
}

/// Compute backend driving one Scaleway instance.
#[derive(Clone)]
pub struct ScalewayBackend {
    target: Result<Target, String>,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl ScalewayBackend {
    /// Builds a backend from configuration.
    ///
    /// Incomplete configuration is not an error here: the backend reports
    /// itself unconfigured and every operation fails with
    /// [`ComputeError::Unconfigured`] naming the missing setting.
    #[must_use]
    pub fn new(config: &ComputeConfig) -> Self {
        let target = config
            .validate()
            .map_err(|err| err.to_string())
            .and_then(|()| match (&config.secret_key, &config.instance_id) {
                (Some(secret_key), Some(instance_id)) => Ok(Target {
                    api: ScalewayApi::new(secret_key.trim()),
                    zone: Zone::from(config.default_zone.trim()),
                    instance_id: InstanceId::from(instance_id.trim()),
                }),
                _ => Err(String::from("missing Scaleway credentials")),
            });
        Self {
            target,
            poll_interval: power::POLL_INTERVAL,
            wait_timeout: power::WAIT_TIMEOUT,
        }
    }

    /// Overrides the pause between provider polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides how long a power transition may take.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    fn target(&self) -> Result<&Target, ScalewayBackendError> {
        self.target
            .as_ref()
            .map_err(|reason| ScalewayBackendError::Config(reason.clone()))
    }
}

impl ComputeBackend for ScalewayBackend {
    fn is_configured(&self) -> bool {
        self.target.is_ok()
    }

    fn start(&self) -> ComputeFuture<'_, ()> {
        Box::pin(async move { self.drive(Power::On).await.map_err(ComputeError::from) })
    }

    fn stop(&self) -> ComputeFuture<'_, ()> {
        Box::pin(async move { self.drive(Power::Off).await.map_err(ComputeError::from) })
    }

    fn is_running(&self) -> ComputeFuture<'_, bool> {
        Box::pin(async move {
            let status = self.describe().await?;
            Ok(status.label == "running")
        })
    }

    fn describe(&self) -> ComputeFuture<'_, ComputeStatus> {
        Box::pin(async move {
            let target = self.target()?;
            let snapshot = self.fetch_snapshot(target).await?;
            Ok(ComputeStatus::from_label(snapshot.state.as_str()))
        })
    }
}

#[cfg(test)]
mod tests;
