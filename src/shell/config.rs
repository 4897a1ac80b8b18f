//! Remote shell configuration structures and validation.
//!
//! [`ShellConfig`] carries the SSH connection settings and the `screen`
//! session layout used to launch and stop the game process. It is loaded via
//! `ortho-config`, which merges defaults, configuration files, and
//! environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default `screen` session hosting the game process.
pub const DEFAULT_SESSION_NAME: &str = "minecraft";

/// Default directory the game server is launched from.
pub const DEFAULT_SERVER_DIR: &str = "~/minecraft";

/// SSH and process-layout settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "WARDEN_SHELL",
    discovery(
        app_name = "warden",
        env_var = "WARDEN_CONFIG_PATH",
        config_file_name = "warden.toml",
        dotfile_name = ".warden.toml",
        project_file_name = "warden.toml"
    )
)]
pub struct ShellConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Host name or address of the game server instance.
    pub ssh_host: Option<String>,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// SSH port on the instance.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Private key used for authentication. Supports `~/` expansion. The
    /// shell counts as unavailable until this is set.
    pub identity_file: Option<String>,
    /// Whether to force batch mode so SSH never prompts.
    #[ortho_config(default = true)]
    pub batch_mode: bool,
    /// Whether to enforce host key checking.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
    /// Seconds SSH may spend establishing the connection.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
    /// Name of the `screen` session hosting the game process.
    #[ortho_config(default = DEFAULT_SESSION_NAME.to_owned())]
    pub session_name: String,
    /// Directory the launch command runs from.
    #[ortho_config(default = DEFAULT_SERVER_DIR.to_owned())]
    pub server_dir: String,
    /// Command that runs the game server in the foreground.
    #[ortho_config(default = "java -Xms1G -Xmx4G -jar server.jar nogui".to_owned())]
    pub launch_command: String,
}

/// Errors raised by remote shell configuration.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ShellConfigError {
    /// A field holds an unusable value.
    #[error("invalid remote shell configuration for {field}: {message}")]
    Invalid {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
    /// Parsing or merging configuration layers failed.
    #[error("remote shell configuration parsing failed: {0}")]
    Parse(String),
}

impl ShellConfig {
    /// Loads configuration from defaults, configuration files, and
    /// environment variables without parsing process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ShellConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ShellConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("warden")])
            .map_err(|err| ShellConfigError::Parse(err.to_string()))
    }

    /// Checks that configured values are usable. Host and identity may be
    /// absent; the shell then reports itself unavailable instead.
    ///
    /// # Errors
    ///
    /// Returns [`ShellConfigError::Invalid`] for blank required values or a
    /// session name that is unsafe to interpolate into shell commands.
    pub fn validate(&self) -> Result<(), ShellConfigError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_value(&self.server_dir, "server_dir")?;
        Self::require_value(&self.launch_command, "launch_command")?;
        Self::require_optional_value(self.ssh_host.as_deref(), "ssh_host")?;
        Self::require_optional_value(self.identity_file.as_deref(), "identity_file")?;

        let session_is_safe = !self.session_name.is_empty()
            && self
                .session_name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'));
        if !session_is_safe {
            return Err(ShellConfigError::Invalid {
                field: String::from("session_name"),
                message: String::from(
                    "use only ASCII letters, digits, '-' or '_' (set WARDEN_SHELL_SESSION_NAME)",
                ),
            });
        }
        Ok(())
    }

    /// Returns the configured host when it is non-blank.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.ssh_host.as_deref().map(str::trim).filter(|host| !host.is_empty())
    }

    /// Returns the configured identity file when it is non-blank.
    #[must_use]
    pub fn identity_file(&self) -> Option<&str> {
        self.identity_file
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    fn require_value(value: &str, field: &str) -> Result<(), ShellConfigError> {
        if value.trim().is_empty() {
            return Err(ShellConfigError::Invalid {
                field: field.to_owned(),
                message: format!(
                    "must not be empty (set WARDEN_SHELL_{} or add {field} to warden.toml)",
                    field.to_ascii_uppercase()
                ),
            });
        }
        Ok(())
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), ShellConfigError> {
        match value {
            Some(inner) if inner.trim().is_empty() => Self::require_value(inner, field),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_config() -> ShellConfig {
    ShellConfig {
        ssh_bin: String::from("ssh"),
        ssh_host: Some(String::from("203.0.113.10")),
        ssh_user: String::from("steve"),
        ssh_port: 2222,
        identity_file: Some(String::from("/keys/id_ed25519")),
        batch_mode: true,
        strict_host_key_checking: false,
        known_hosts_file: String::from("/dev/null"),
        connect_timeout_secs: 10,
        session_name: String::from(DEFAULT_SESSION_NAME),
        server_dir: String::from(DEFAULT_SERVER_DIR),
        launch_command: String::from("./run.sh"),
    }
}
