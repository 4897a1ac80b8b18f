//! Remote shell channel to the game server host.
//!
//! Commands run through the system `ssh` client, one connection per call.
//! The process layer sits behind [`CommandRunner`] so tests can script
//! outcomes without spawning anything.

mod config;
mod runner;
mod scripts;

use std::ffi::OsString;
use std::time::Duration;

use tracing::debug;

use crate::channel::{ChannelError, ChannelFuture, ChannelKind, CommandChannel, CommandResult};

pub use config::{DEFAULT_SERVER_DIR, DEFAULT_SESSION_NAME, ShellConfig, ShellConfigError};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, RunnerError, RunnerFuture};
pub use scripts::{GameScripts, parse_session_probe};

#[cfg(test)]
pub(crate) use config::sample_config;

/// Exit status `ssh` reserves for its own failures.
const SSH_FAILURE_CODE: i32 = 255;

/// Executes commands on the host over SSH.
#[derive(Clone, Debug)]
pub struct RemoteShell<R: CommandRunner> {
    config: ShellConfig,
    runner: R,
}

impl RemoteShell<ProcessCommandRunner> {
    /// Creates a shell that spawns the real `ssh` binary.
    ///
    /// # Errors
    ///
    /// Returns [`ShellConfigError`] when configuration validation fails.
    pub fn with_process_runner(config: ShellConfig) -> Result<Self, ShellConfigError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> RemoteShell<R> {
    /// Creates a shell using a custom runner.
    ///
    /// # Errors
    ///
    /// Returns [`ShellConfigError`] when configuration validation fails.
    pub fn new(config: ShellConfig, runner: R) -> Result<Self, ShellConfigError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns the shell configuration.
    #[must_use]
    pub const fn config(&self) -> &ShellConfig {
        &self.config
    }

    fn unavailable_reason(&self) -> Option<&'static str> {
        if self.config.host().is_none() {
            return Some("no host configured (set WARDEN_SHELL_SSH_HOST or add ssh_host to warden.toml)");
        }
        if self.config.identity_file().is_none() {
            return Some("no identity file configured (set WARDEN_SHELL_IDENTITY_FILE)");
        }
        None
    }

    fn build_ssh_args(&self, host: &str, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout_secs
            )),
        ];
        if let Some(identity_file) = self.config.identity_file() {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }
        if self.config.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }
        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }
        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }
        args.push(OsString::from(format!("{}@{host}", self.config.ssh_user)));
        args.push(OsString::from(command));
        args
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.config.connect_timeout_secs)
    }
}

impl<R: CommandRunner> CommandChannel for RemoteShell<R> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::RemoteShell
    }

    fn is_available(&self) -> bool {
        self.unavailable_reason().is_none()
    }

    fn execute<'a>(&'a self, command: &'a str, timeout: Duration) -> ChannelFuture<'a> {
        Box::pin(async move {
            let (Some(host), None) = (self.config.host(), self.unavailable_reason()) else {
                return Err(ChannelError::Unavailable {
                    channel: ChannelKind::RemoteShell,
                    reason: self
                        .unavailable_reason()
                        .unwrap_or("no host configured")
                        .to_owned(),
                });
            };
            let args = self.build_ssh_args(host, command);
            debug!(host, command, "running remote shell command");

            let output =
                match tokio::time::timeout(timeout, self.runner.run(&self.config.ssh_bin, &args))
                    .await
                {
                    Ok(Ok(output)) => output,
                    Ok(Err(err)) => {
                        return Err(ChannelError::Failed {
                            channel: ChannelKind::RemoteShell,
                            message: err.to_string(),
                        });
                    }
                    Err(_) => {
                        return Err(ChannelError::Timeout {
                            channel: ChannelKind::RemoteShell,
                            stage: "exec",
                            timeout,
                        });
                    }
                };

            interpret_output(&output, self.connect_timeout())
        })
    }
}

fn interpret_output(
    output: &CommandOutput,
    connect_timeout: Duration,
) -> Result<CommandResult, ChannelError> {
    match output.code {
        Some(0) => Ok(CommandResult::success(
            ChannelKind::RemoteShell,
            output.combined(),
        )),
        Some(SSH_FAILURE_CODE) => {
            let stderr = output.stderr.trim();
            if stderr.to_ascii_lowercase().contains("timed out") {
                Err(ChannelError::Timeout {
                    channel: ChannelKind::RemoteShell,
                    stage: "connect",
                    timeout: connect_timeout,
                })
            } else {
                Err(ChannelError::Failed {
                    channel: ChannelKind::RemoteShell,
                    message: if stderr.is_empty() {
                        String::from("ssh exited with status 255")
                    } else {
                        stderr.to_owned()
                    },
                })
            }
        }
        Some(code) => Ok(CommandResult::failure(
            ChannelKind::RemoteShell,
            output.combined(),
            format!("remote command exited with status {code}"),
        )),
        None => Ok(CommandResult::failure(
            ChannelKind::RemoteShell,
            output.combined(),
            "remote command terminated without an exit status",
        )),
    }
}

/// Expands a leading `~/` prefix to the local user's home directory.
///
/// The input is returned unchanged when `HOME` is not set.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}
