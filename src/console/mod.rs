//! Game console channel speaking the RCON protocol.
//!
//! Every call opens a fresh TCP session, authenticates, sends one command,
//! reads one reply, and closes. No connection is kept between calls.

mod config;
pub mod packet;
mod players;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::channel::{ChannelError, ChannelFuture, ChannelKind, CommandChannel, CommandResult};
use packet::{AUTH_REJECTED_ID, COMMAND, LOGIN, PacketError, RconPacket, read_packet};

pub use config::{ConsoleConfig, ConsoleConfigError, DEFAULT_RCON_PORT};
pub use players::{PlayerCount, parse_player_list};

/// Command that asks the server for its player list.
pub const LIST_COMMAND: &str = "list";

const LOGIN_REQUEST_ID: i32 = 1;
const COMMAND_REQUEST_ID: i32 = 2;
/// Replies a server may send before the login verdict.
const MAX_LOGIN_PACKETS: usize = 2;

/// RCON client for the game process.
#[derive(Clone, Debug)]
pub struct GameConsole {
    config: ConsoleConfig,
}

impl GameConsole {
    /// Creates a console client.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleConfigError`] when configuration validation fails.
    pub fn new(config: ConsoleConfig) -> Result<Self, ConsoleConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    async fn session(&self, host: &str, password: &str, command: &str) -> Result<String, ChannelError> {
        let mut stream = TcpStream::connect((host, self.config.rcon_port))
            .await
            .map_err(|err| failed(format!("connect to {host}:{}: {err}", self.config.rcon_port)))?;

        send(&mut stream, &RconPacket::new(LOGIN_REQUEST_ID, LOGIN, password)).await?;
        let mut authenticated = false;
        for _ in 0..MAX_LOGIN_PACKETS {
            let reply = read_packet(&mut stream).await.map_err(packet_failure)?;
            if reply.request_id == AUTH_REJECTED_ID {
                return Err(failed("authentication rejected by server"));
            }
            if reply.kind == COMMAND {
                authenticated = true;
                break;
            }
        }
        if !authenticated {
            return Err(failed("server never answered the login request"));
        }

        send(&mut stream, &RconPacket::new(COMMAND_REQUEST_ID, COMMAND, command)).await?;
        let reply = read_packet(&mut stream).await.map_err(packet_failure)?;
        if reply.request_id != COMMAND_REQUEST_ID {
            return Err(failed(format!(
                "reply id {} does not match request {COMMAND_REQUEST_ID}",
                reply.request_id
            )));
        }
        stream.shutdown().await.ok();
        Ok(reply.body)
    }
}

impl CommandChannel for GameConsole {
    fn kind(&self) -> ChannelKind {
        ChannelKind::GameConsole
    }

    fn is_available(&self) -> bool {
        self.config.rcon_enabled && self.config.host().is_some() && self.config.password().is_some()
    }

    fn execute<'a>(&'a self, command: &'a str, limit: Duration) -> ChannelFuture<'a> {
        Box::pin(async move {
            let (true, Some(host), Some(password)) = (
                self.config.rcon_enabled,
                self.config.host(),
                self.config.password(),
            ) else {
                return Err(ChannelError::Disabled {
                    channel: ChannelKind::GameConsole,
                });
            };

            debug!(host, command, "sending console command");
            match timeout(limit, self.session(host, password, command)).await {
                Ok(Ok(body)) => Ok(CommandResult::success(ChannelKind::GameConsole, body)),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(ChannelError::Timeout {
                    channel: ChannelKind::GameConsole,
                    stage: "exec",
                    timeout: limit,
                }),
            }
        })
    }
}

async fn send(stream: &mut TcpStream, packet: &RconPacket) -> Result<(), ChannelError> {
    let frame = packet.encode().map_err(packet_failure)?;
    stream
        .write_all(&frame)
        .await
        .map_err(|err| failed(format!("write: {err}")))
}

fn packet_failure(err: PacketError) -> ChannelError {
    failed(err.to_string())
}

fn failed(message: impl Into<String>) -> ChannelError {
    ChannelError::Failed {
        channel: ChannelKind::GameConsole,
        message: message.into(),
    }
}
