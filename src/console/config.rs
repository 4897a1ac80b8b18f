//! Game console configuration.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default RCON port.
pub const DEFAULT_RCON_PORT: u16 = 25_575;

/// RCON settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "WARDEN_CONSOLE",
    discovery(
        app_name = "warden",
        env_var = "WARDEN_CONFIG_PATH",
        config_file_name = "warden.toml",
        dotfile_name = ".warden.toml",
        project_file_name = "warden.toml"
    )
)]
pub struct ConsoleConfig {
    /// Whether RCON may be used at all.
    #[ortho_config(default = false)]
    pub rcon_enabled: bool,
    /// Host serving RCON.
    pub rcon_host: Option<String>,
    /// RCON port.
    #[ortho_config(default = DEFAULT_RCON_PORT)]
    pub rcon_port: u16,
    /// RCON password.
    pub rcon_password: Option<String>,
    /// In-game command that saves the world and stops the server.
    #[ortho_config(default = "stop".to_owned())]
    pub stop_command: String,
}

/// Errors raised by console configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConsoleConfigError {
    /// Enabled without the settings needed to connect.
    #[error("game console is enabled but {0}")]
    Incomplete(String),
    /// A field holds an unusable value.
    #[error("invalid game console configuration: {0}")]
    Invalid(String),
    /// Parsing or merging configuration layers failed.
    #[error("game console configuration parsing failed: {0}")]
    Parse(String),
}

impl ConsoleConfig {
    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConsoleConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("warden")])
            .map_err(|err| ConsoleConfigError::Parse(err.to_string()))
    }

    /// Checks that an enabled console can actually connect.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleConfigError::Incomplete`] when the console is enabled
    /// without a host or password, and [`ConsoleConfigError::Invalid`] for a
    /// blank stop command.
    pub fn validate(&self) -> Result<(), ConsoleConfigError> {
        if self.stop_command.trim().is_empty() {
            return Err(ConsoleConfigError::Invalid(String::from(
                "stop_command must not be empty (set WARDEN_CONSOLE_STOP_COMMAND or add stop_command to warden.toml)",
            )));
        }
        if !self.rcon_enabled {
            return Ok(());
        }
        if self.host().is_none() {
            return Err(ConsoleConfigError::Incomplete(String::from(
                "no host is set (set WARDEN_CONSOLE_RCON_HOST or add rcon_host to warden.toml)",
            )));
        }
        if self.password().is_none() {
            return Err(ConsoleConfigError::Incomplete(String::from(
                "no password is set (set WARDEN_CONSOLE_RCON_PASSWORD or add rcon_password to warden.toml)",
            )));
        }
        Ok(())
    }

    /// Returns the configured host when it is non-blank.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.rcon_host.as_deref().map(str::trim).filter(|host| !host.is_empty())
    }

    /// Returns the configured password when it is non-empty.
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.rcon_password.as_deref().filter(|password| !password.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> ConsoleConfig {
        ConsoleConfig {
            rcon_enabled: true,
            rcon_host: Some(String::from("127.0.0.1")),
            rcon_port: DEFAULT_RCON_PORT,
            rcon_password: Some(String::from("hunter2")),
            stop_command: String::from("stop"),
        }
    }

    #[test]
    fn disabled_console_needs_no_credentials() {
        let config = ConsoleConfig {
            rcon_enabled: false,
            rcon_host: None,
            rcon_password: None,
            ..enabled()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enabled_console_requires_password() {
        let config = ConsoleConfig {
            rcon_password: None,
            ..enabled()
        };
        let err = config.validate().expect_err("missing password should fail");
        assert!(err.to_string().contains("WARDEN_CONSOLE_RCON_PASSWORD"));
    }
}
