//! Command-line interface definitions for the `warden` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `warden` binary.
#[derive(Debug, Parser)]
#[command(
    name = "warden",
    about = "Start, stop, and watch a game server on a Scaleway instance",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Power on the instance and launch the game.
    #[command(name = "start", about = "Power on the instance and launch the game")]
    Start(StartCommand),
    /// Stop the game gracefully and deallocate the instance.
    #[command(
        name = "stop",
        about = "Stop the game gracefully and deallocate the instance"
    )]
    Stop(StopCommand),
    /// Kill and relaunch the game without touching the instance.
    #[command(
        name = "restart",
        about = "Kill and relaunch the game without touching the instance"
    )]
    Restart,
    /// Show the instance state, player count, and last requester.
    #[command(
        name = "status",
        about = "Show the instance state, player count, and last requester"
    )]
    Status(StatusCommand),
    /// Read commands from stdin and stop the server when it sits empty.
    #[command(
        name = "serve",
        about = "Read commands from stdin and stop the server when it sits empty"
    )]
    Serve(ServeCommand),
}

/// Arguments for the `warden start` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StartCommand {
    /// Channel that receives progress and outcome notifications.
    ///
    /// It is persisted, so later stops and automatic shutdowns report back
    /// to the same place.
    #[arg(long, value_name = "ID", default_value = "cli")]
    pub(crate) channel: String,
}

/// Arguments for the `warden stop` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StopCommand {
    /// Send the graceful stop through the remote shell before trying the
    /// game console.
    #[arg(long)]
    pub(crate) shell_first: bool,
}

/// Arguments for the `warden status` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct StatusCommand {
    /// Print the report as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

/// Arguments for the `warden serve` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ServeCommand {
    /// Channel recorded for `start` lines that do not name one.
    #[arg(long, value_name = "ID", default_value = "console")]
    pub(crate) channel: String,
}
