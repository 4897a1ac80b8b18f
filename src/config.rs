//! Configuration loading via `ortho-config`.
//!
//! [`ComputeConfig`] holds the Scaleway credentials and target instance.
//! [`WardenConfig`] holds the lifecycle tunables, the probe address, and the
//! state file location. Channel settings live next to their channels in
//! [`crate::shell`] and [`crate::console`].

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::controller::{LifecycleTimings, StopPreference};
use crate::probe::ProbeTarget;

/// Scaleway credentials and the instance under management.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SCW",
    discovery(
        app_name = "warden",
        env_var = "WARDEN_CONFIG_PATH",
        config_file_name = "warden.toml",
        dotfile_name = ".warden.toml",
        project_file_name = "warden.toml"
    )
)]
pub struct ComputeConfig {
    /// Access key assigned to the Scaleway application. Not needed for API
    /// calls; captured so audit logs can name the caller.
    pub access_key: Option<String>,
    /// Secret key used for authentication. Compute stays unconfigured until
    /// it is set.
    pub secret_key: Option<String>,
    /// Availability zone of the instance. Defaults to `fr-par-1`.
    #[ortho_config(default = "fr-par-1".to_owned())]
    pub default_zone: String,
    /// Identifier of the instance that hosts the game server.
    pub instance_id: Option<String>,
}

/// Lifecycle tunables and local state settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "WARDEN",
    discovery(
        app_name = "warden",
        env_var = "WARDEN_CONFIG_PATH",
        config_file_name = "warden.toml",
        dotfile_name = ".warden.toml",
        project_file_name = "warden.toml"
    )
)]
pub struct WardenConfig {
    /// Game server address for the status probe, as `host` or `host:port`.
    pub probe_address: Option<String>,
    /// Seconds to wait for the game to confirm it stopped.
    #[ortho_config(default = 300)]
    pub max_wait_secs: u64,
    /// Seconds between shutdown confirmation polls.
    #[ortho_config(default = 3)]
    pub poll_interval_secs: u64,
    /// Consecutive empty samples that trigger an automatic shutdown.
    #[ortho_config(default = 3)]
    pub empty_sample_threshold: u32,
    /// Minutes between automatic shutdown samples.
    #[ortho_config(default = 5)]
    pub auto_shutdown_interval_minutes: u64,
    /// Channel tried first when the automatic shutdown stops the game:
    /// `console` or `shell`.
    #[ortho_config(default = "console".to_owned())]
    pub auto_shutdown_stop_channel: String,
    /// Seconds to let the instance boot before launching the game.
    #[ortho_config(default = 30)]
    pub boot_grace_secs: u64,
    /// Seconds to wait for the game to answer the probe after launch.
    #[ortho_config(default = 300)]
    pub start_timeout_secs: u64,
    /// Seconds between probes while waiting for the game to come up.
    #[ortho_config(default = 10)]
    pub start_poll_interval_secs: u64,
    /// Seconds a single shell or console command may take.
    #[ortho_config(default = 30)]
    pub command_timeout_secs: u64,
    /// Seconds a single status probe may take.
    #[ortho_config(default = 5)]
    pub probe_timeout_secs: u64,
    /// File recording who requested the last start.
    #[ortho_config(default = "warden-state.toml".to_owned())]
    pub state_file: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to warden.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

fn require_field(value: Option<&str>, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    match value {
        Some(inner) if !inner.trim().is_empty() => Ok(()),
        _ => Err(metadata.missing()),
    }
}

fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be greater than zero: set {} or {} in warden.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl ComputeConfig {
    /// Loads configuration without parsing process arguments. Values merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("warden")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that the backend can make API calls. Missing values leave
    /// compute unconfigured rather than failing startup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the first missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            self.secret_key.as_deref(),
            &FieldMetadata::new("Scaleway API secret key", "SCW_SECRET_KEY", "secret_key"),
        )?;
        require_field(
            self.instance_id.as_deref(),
            &FieldMetadata::new("game server instance ID", "SCW_INSTANCE_ID", "instance_id"),
        )?;
        require_field(
            Some(self.default_zone.as_str()),
            &FieldMetadata::new("availability zone", "SCW_DEFAULT_ZONE", "default_zone"),
        )
    }
}

impl WardenConfig {
    /// Loads configuration without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("warden")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks tunables and parses the probe address and stop preference.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero intervals, an unparsable
    /// probe address, or an unknown stop channel, and
    /// [`ConfigError::MissingField`] for a blank state file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in [
            (
                self.poll_interval_secs,
                FieldMetadata::new("poll interval", "WARDEN_POLL_INTERVAL_SECS", "poll_interval_secs"),
            ),
            (
                self.auto_shutdown_interval_minutes,
                FieldMetadata::new(
                    "auto-shutdown interval",
                    "WARDEN_AUTO_SHUTDOWN_INTERVAL_MINUTES",
                    "auto_shutdown_interval_minutes",
                ),
            ),
            (
                self.start_poll_interval_secs,
                FieldMetadata::new(
                    "start poll interval",
                    "WARDEN_START_POLL_INTERVAL_SECS",
                    "start_poll_interval_secs",
                ),
            ),
            (
                self.command_timeout_secs,
                FieldMetadata::new(
                    "command timeout",
                    "WARDEN_COMMAND_TIMEOUT_SECS",
                    "command_timeout_secs",
                ),
            ),
            (
                self.probe_timeout_secs,
                FieldMetadata::new("probe timeout", "WARDEN_PROBE_TIMEOUT_SECS", "probe_timeout_secs"),
            ),
            (
                u64::from(self.empty_sample_threshold),
                FieldMetadata::new(
                    "empty sample threshold",
                    "WARDEN_EMPTY_SAMPLE_THRESHOLD",
                    "empty_sample_threshold",
                ),
            ),
        ] {
            require_positive(value, &metadata)?;
        }
        require_field(
            Some(self.state_file.as_str()),
            &FieldMetadata::new("state file path", "WARDEN_STATE_FILE", "state_file"),
        )?;
        self.probe_target()?;
        self.auto_shutdown_preference()?;
        Ok(())
    }

    /// Parses the probe address, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address cannot be parsed.
    pub fn probe_target(&self) -> Result<Option<ProbeTarget>, ConfigError> {
        self.probe_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(|address| {
                address
                    .parse::<ProbeTarget>()
                    .map_err(|err| ConfigError::Invalid(format!("{err} (WARDEN_PROBE_ADDRESS)")))
            })
            .transpose()
    }

    /// Parses which channel the automatic shutdown tries first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values other than `console` or
    /// `shell`.
    pub fn auto_shutdown_preference(&self) -> Result<StopPreference, ConfigError> {
        self.auto_shutdown_stop_channel.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "auto_shutdown_stop_channel must be 'console' or 'shell', got '{}' (WARDEN_AUTO_SHUTDOWN_STOP_CHANNEL)",
                self.auto_shutdown_stop_channel
            ))
        })
    }

    /// Interval between automatic shutdown samples.
    #[must_use]
    pub const fn auto_shutdown_interval(&self) -> Duration {
        Duration::from_secs(self.auto_shutdown_interval_minutes.saturating_mul(60))
    }

    /// Timing settings for the lifecycle controller.
    #[must_use]
    pub const fn timings(&self) -> LifecycleTimings {
        LifecycleTimings {
            boot_grace: Duration::from_secs(self.boot_grace_secs),
            start_timeout: Duration::from_secs(self.start_timeout_secs),
            start_poll_interval: Duration::from_secs(self.start_poll_interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// A configuration field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
pub(crate) fn sample_warden_config() -> WardenConfig {
    WardenConfig {
        probe_address: Some(String::from("mc.example.net")),
        max_wait_secs: 300,
        poll_interval_secs: 3,
        empty_sample_threshold: 3,
        auto_shutdown_interval_minutes: 5,
        auto_shutdown_stop_channel: String::from("console"),
        boot_grace_secs: 30,
        start_timeout_secs: 300,
        start_poll_interval_secs: 10,
        command_timeout_secs: 30,
        probe_timeout_secs: 5,
        state_file: String::from("warden-state.toml"),
    }
}
