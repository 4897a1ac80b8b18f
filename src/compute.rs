//! Compute backend abstraction for the instance hosting the game server.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::model::InstanceState;

/// Boxed future returned by [`ComputeBackend`] operations.
pub type ComputeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ComputeError>> + Send + 'a>>;

/// Provider view of the instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ComputeStatus {
    /// Lifecycle state derived from the provider label.
    pub state: InstanceState,
    /// Raw provider label, for display.
    pub label: String,
}

impl ComputeStatus {
    /// Builds a status from a provider label.
    #[must_use]
    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            state: InstanceState::from_provider_label(&label),
            label,
        }
    }
}

/// Errors raised by compute backends.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// Credentials or the instance identifier are missing.
    #[error("compute backend is not configured: {0}")]
    Unconfigured(String),
    /// The provider rejected or failed a request.
    #[error("provider error: {0}")]
    Provider(String),
    /// The instance did not reach the requested state in time.
    #[error("timed out waiting for instance {instance_id} to become {target}")]
    Timeout {
        /// Provider instance identifier.
        instance_id: String,
        /// State that was awaited.
        target: String,
    },
}

/// Starts, stops, and inspects the managed instance.
///
/// Every call reflects live provider state; implementations keep no cache.
pub trait ComputeBackend: Send + Sync {
    /// Returns `true` when credentials and an instance are configured.
    fn is_configured(&self) -> bool;

    /// Powers the instance on and waits until the provider reports it running.
    fn start(&self) -> ComputeFuture<'_, ()>;

    /// Powers the instance off, releasing billable compute, and waits until
    /// the provider reports it stopped.
    fn stop(&self) -> ComputeFuture<'_, ()>;

    /// Returns `true` when the provider reports the instance running.
    fn is_running(&self) -> ComputeFuture<'_, bool>;

    /// Describes the instance state.
    fn describe(&self) -> ComputeFuture<'_, ComputeStatus>;
}
