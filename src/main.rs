//! Binary entry point for the Warden CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, ServeCommand, StatusCommand};
use warden::{
    AppError, LifecycleController, LifecycleError, RequesterChannel, StdoutNotifier,
    StopPreference, Warden, WardenSources,
};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] AppError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("failed to render output: {0}")]
    Output(String),
    #[error("failed to read commands: {0}")]
    Input(String),
}

/// A line typed into `warden serve`.
#[derive(Debug, Eq, PartialEq)]
enum ServeRequest {
    Start(Option<String>),
    Stop,
    Restart,
    Status,
    Help,
}

const SERVE_HELP: &str = "commands: start [channel], stop, restart, status, help";

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let sources = WardenSources::load_without_cli_args()?;
    let warden = Warden::assemble(&sources, Arc::new(StdoutNotifier))?;
    let controller = warden.controller();

    match cli {
        Cli::Start(command) => {
            let outcome = controller.start(RequesterChannel::new(command.channel)).await?;
            emit(&outcome.to_string());
        }
        Cli::Stop(command) => {
            let preference = if command.shell_first {
                StopPreference::ShellFirst
            } else {
                StopPreference::ConsoleFirst
            };
            let outcome = controller.stop_with(preference).await?;
            emit(&outcome.to_string());
        }
        Cli::Restart => {
            let outcome = controller.restart().await?;
            emit(&outcome.to_string());
        }
        Cli::Status(command) => print_status(controller, &command).await?,
        Cli::Serve(command) => serve(&warden, &command).await?,
    }
    Ok(())
}

async fn print_status(
    controller: &LifecycleController,
    command: &StatusCommand,
) -> Result<(), CliError> {
    let report = controller.status().await;
    if command.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| CliError::Output(err.to_string()))?;
        emit(&rendered);
    } else {
        emit(&report.to_string());
    }
    Ok(())
}

async fn serve(warden: &Warden, command: &ServeCommand) -> Result<(), CliError> {
    warden.resume_monitoring().await;
    emit(SERVE_HELP);

    let mut operations = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = true;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            signal = &mut interrupted => {
                signal.map_err(|err| CliError::Input(err.to_string()))?;
                info!("interrupted");
                break;
            }
            line = lines.next_line(), if reading => {
                match line.map_err(|err| CliError::Input(err.to_string()))? {
                    Some(text) => match parse_request(&text) {
                        Ok(Some(request)) => {
                            handle_request(&mut operations, warden.controller(), request, &command.channel);
                        }
                        Ok(None) => {}
                        Err(message) => emit(&message),
                    },
                    None => {
                        info!("input closed; serving until interrupted");
                        reading = false;
                    }
                }
            }
            Some(joined) = operations.join_next(), if !operations.is_empty() => {
                report_join(joined);
            }
        }
    }

    warden.monitor().drain().await;
    if !operations.is_empty() {
        info!(pending = operations.len(), "waiting for operations to finish");
    }
    while let Some(joined) = operations.join_next().await {
        report_join(joined);
    }
    Ok(())
}

fn handle_request(
    operations: &mut JoinSet<()>,
    controller: &Arc<LifecycleController>,
    request: ServeRequest,
    default_channel: &str,
) {
    let shared = Arc::clone(controller);
    match request {
        ServeRequest::Start(channel) => {
            let requester =
                RequesterChannel::new(channel.as_deref().unwrap_or(default_channel));
            operations.spawn(async move {
                log_result("start", shared.start(requester).await.map(|outcome| outcome.to_string()));
            });
        }
        ServeRequest::Stop => {
            operations.spawn(async move {
                log_result("stop", shared.stop().await.map(|outcome| outcome.to_string()));
            });
        }
        ServeRequest::Restart => {
            operations.spawn(async move {
                log_result("restart", shared.restart().await.map(|outcome| outcome.to_string()));
            });
        }
        ServeRequest::Status => {
            operations.spawn(async move {
                emit(&shared.status().await.to_string());
            });
        }
        ServeRequest::Help => emit(SERVE_HELP),
    }
}

fn report_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        warn!(%err, "operation task ended abnormally");
    }
}

fn log_result(operation: &str, result: Result<String, LifecycleError>) {
    match result {
        Ok(outcome) => info!(operation, %outcome, "operation finished"),
        Err(LifecycleError::OperationInProgress) => {
            emit(&format!("{operation} refused: another operation is in progress"));
        }
        Err(err) => warn!(operation, %err, "operation failed"),
    }
}

fn parse_request(line: &str) -> Result<Option<ServeRequest>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let argument = words.next().map(str::to_owned);
    if words.next().is_some() {
        return Err(format!("too many arguments: {line}"));
    }
    let request = match (verb.to_ascii_lowercase().as_str(), argument) {
        ("start", channel) => ServeRequest::Start(channel),
        ("stop", None) => ServeRequest::Stop,
        ("restart", None) => ServeRequest::Restart,
        ("status", None) => ServeRequest::Status,
        ("help", None) => ServeRequest::Help,
        (other, _) => return Err(format!("unknown command '{other}'; {SERVE_HELP}")),
    };
    Ok(Some(request))
}

fn emit(text: &str) {
    writeln!(io::stdout(), "{text}").ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
