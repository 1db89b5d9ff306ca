//! Command phase. Each packet after authentication is one command byte
//! followed by its argument.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::query::QueryExecutor;
use super::packet::{ErrPacket, OkPacket, Packet};
use super::protocol::*;

/// What the connection should do after a command packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    Reply(Packet),
    /// Nothing to send; keep reading.
    Ignore,
    /// `COM_QUIT`: no reply, close the connection.
    Quit,
}

pub struct Session {
    connection_id: u32,
    username: String,
    current_db: Option<String>,
    executor: Arc<dyn QueryExecutor>,
}

impl Session {
    pub fn new(
        connection_id: u32,
        username: String,
        current_db: Option<String>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            connection_id,
            username,
            current_db,
            executor,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn current_db(&self) -> Option<&str> {
        self.current_db.as_deref()
    }

    /// Handles one command packet. Failures become ERR replies; the session
    /// stays usable.
    pub async fn dispatch(&mut self, packet: &Packet) -> SessionAction {
        let Some((&cmd, args)) = packet.payload.split_first() else {
            return SessionAction::Ignore;
        };
        let sequence_id = packet.sequence_id.wrapping_add(1);
        let command = Command::from(cmd);

        debug!(connection_id = self.connection_id, ?command, "command received");

        match self.handle_command(command, args).await {
            Ok(Some(payload)) => SessionAction::Reply(Packet::new(sequence_id, payload)),
            Ok(None) => SessionAction::Quit,
            Err(e) => {
                warn!(connection_id = self.connection_id, error = %e, "command failed");
                SessionAction::Reply(Packet::new(sequence_id, error_packet(&e).encode()))
            }
        }
    }

    async fn handle_command(&mut self, command: Command, args: &[u8]) -> Result<Option<Bytes>> {
        match command {
            Command::Quit => {
                info!(connection_id = self.connection_id, "COM_QUIT received");
                Ok(None)
            }
            Command::InitDb => {
                let db_name = String::from_utf8_lossy(args).into_owned();
                info!(connection_id = self.connection_id, db = %db_name, "COM_INIT_DB received");
                self.current_db = Some(db_name);
                Ok(Some(ok_payload()))
            }
            Command::Query => {
                let statement = std::str::from_utf8(args).map_err(|_| {
                    ProxyError::InvalidPacket("query text is not valid UTF-8".to_string())
                })?;
                debug!(connection_id = self.connection_id, query = statement.trim(), "COM_QUERY received");

                let payload = match self.executor.execute(statement).await {
                    Ok(payload) => payload,
                    Err(e) => ErrPacket::new(e.code, e.sql_state, e.message).encode(),
                };
                Ok(Some(payload))
            }
            Command::Ping => Ok(Some(ok_payload())),
            Command::Unknown(b) => Err(ProxyError::UnsupportedCommand(b)),
        }
    }
}

fn ok_payload() -> Bytes {
    OkPacket::new(0, 0, SERVER_STATUS_AUTOCOMMIT).encode()
}

fn error_packet(err: &ProxyError) -> ErrPacket {
    match err {
        ProxyError::UnsupportedCommand(b) => ErrPacket::new(
            ER_UNKNOWN_COM_ERROR,
            SQLSTATE_UNKNOWN_COMMAND,
            format!("Unknown command: 0x{:02x}", b),
        ),
        e if e.is_malformed_input() => {
            ErrPacket::new(ER_PARSE_ERROR, SQLSTATE_SYNTAX_ERROR, e.to_string())
        }
        e => ErrPacket::new(ER_UNKNOWN_ERROR, SQLSTATE_GENERAL, e.to_string()),
    }
}
