use std::sync::Arc;

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::query::QueryExecutor;
use super::handshake::{Handshake, HandshakeState};
use super::packet::Packet;
use super::session::{Session, SessionAction};

/// One client connection: handshake, then the command loop until the client
/// quits or the transport fails.
pub struct MysqlConnection<S> {
    stream: S,
    read_buffer: BytesMut,
    config: Arc<Config>,
    query_executor: Arc<dyn QueryExecutor>,
    rng: StdRng,
}

impl<S> MysqlConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Scrambles come from an OS-seeded generator.
    pub fn new(stream: S, config: Arc<Config>, query_executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_rng(stream, config, query_executor, StdRng::from_os_rng())
    }

    pub fn with_rng(
        stream: S,
        config: Arc<Config>,
        query_executor: Arc<dyn QueryExecutor>,
        rng: StdRng,
    ) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(8192),
            config,
            query_executor,
            rng,
        }
    }

    pub async fn handle(mut self) -> Result<()> {
        let mut handshake = Handshake::new(
            &self.config.server_version,
            self.config.password.clone(),
            &mut self.rng,
        );
        let connection_id = handshake.connection_id();
        info!(connection_id, "new MySQL connection");

        // Send handshake
        self.write_packet(&handshake.greeting()).await?;

        // Receive handshake response
        let packet = self.read_packet().await?;
        let reply = match handshake.handle_response(&packet) {
            Ok(reply) => reply,
            Err(e) => {
                error!(connection_id, error = %e, "invalid handshake response");
                return Err(e);
            }
        };
        self.write_packet(&reply.packet).await?;

        if reply.state == HandshakeState::Rejected {
            return Err(ProxyError::AuthFailed(reply.response.username));
        }

        info!(connection_id, username = %reply.response.username, "client authenticated");

        let mut session = Session::new(
            connection_id,
            reply.response.username,
            reply.response.database,
            self.query_executor.clone(),
        );

        // Command loop
        loop {
            let packet = match self.read_packet().await {
                Ok(packet) => packet,
                Err(ProxyError::ConnectionClosed) => {
                    info!(connection_id, "client disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "error reading packet");
                    return Err(e);
                }
            };

            match session.dispatch(&packet).await {
                SessionAction::Reply(reply) => self.write_packet(&reply).await?,
                SessionAction::Ignore => continue,
                SessionAction::Quit => {
                    debug!(connection_id, username = session.username(), "session ended");
                    return Ok(());
                }
            }
        }
    }

    async fn read_packet(&mut self) -> Result<Packet> {
        loop {
            // Try to decode a packet from buffer
            if let Some(packet) = Packet::decode(&mut self.read_buffer) {
                return Ok(packet);
            }

            // Read more data
            let n = self.stream.read_buf(&mut self.read_buffer).await?;

            if n == 0 {
                if self.read_buffer.is_empty() {
                    return Err(ProxyError::ConnectionClosed);
                }
                return Err(truncated(&self.read_buffer));
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let encoded = packet.encode()?;
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Describes a partial frame left in the buffer when the peer hung up.
fn truncated(buf: &BytesMut) -> ProxyError {
    use super::packet::HEADER_SIZE;

    if buf.len() < HEADER_SIZE {
        return ProxyError::TruncatedRead { expected: HEADER_SIZE, read: buf.len() };
    }
    let len = (buf[0] as usize) | ((buf[1] as usize) << 8) | ((buf[2] as usize) << 16);
    ProxyError::TruncatedRead { expected: len, read: buf.len() - HEADER_SIZE }
}
