//! Error types for the Scaleway backend.

use scaleway_rs::ScalewayError;
use thiserror::Error;

use crate::compute::ComputeError;
use crate::config::ConfigError;

/// Errors raised by the Scaleway backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayBackendError {
    /// Raised when credentials or the instance identifier are missing.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the configured instance does not exist in the zone.
    #[error("instance {instance_id} not found in zone {zone}")]
    InstanceNotFound {
        /// Provider instance identifier.
        instance_id: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the provider refuses an action in the current state.
    #[error("instance {instance_id} in state {state} does not allow {action}")]
    ActionNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
        /// Action that was refused.
        action: String,
    },
    /// Raised when an asynchronous operation exceeds the timeout.
    #[error("timeout waiting for instance {instance_id} to become {target}")]
    Timeout {
        /// Provider instance identifier.
        instance_id: String,
        /// State being waited on.
        target: String,
    },
    /// Wrapper for provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK.
        message: String,
    },
}

impl From<ScalewayError> for ScalewayBackendError {
    fn from(value: ScalewayError) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<ConfigError> for ScalewayBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<ScalewayBackendError> for ComputeError {
    fn from(value: ScalewayBackendError) -> Self {
        match value {
            ScalewayBackendError::Config(message) => Self::Unconfigured(message),
            ScalewayBackendError::Timeout {
                instance_id,
                target,
            } => Self::Timeout {
                instance_id,
                target,
            },
            other => Self::Provider(other.to_string()),
        }
    }
}
