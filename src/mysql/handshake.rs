//! MySQL Handshake Protocol
//!
//! Implements the MySQL handshake sequence:
//! 1. Server sends Initial Handshake packet (v10)
//! 2. Client responds with HandshakeResponse41
//! 3. Server sends OK or ERR packet
//!
//! [`Handshake`] does no I/O of its own beyond [`Handshake::run`]; the async
//! connection drives it packet by packet.

use std::io::{Read, Write};

use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::error::{ProxyError, Result};
use super::auth::verify_native_password;
use super::packet::{ErrPacket, HandshakePacket, HandshakeResponse, OkPacket, Packet, SCRAMBLE_LEN};
use super::protocol::SERVER_STATUS_AUTOCOMMIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingClientResponse,
    Authenticated,
    Rejected,
}

/// The packet to send back to the client and what it means.
#[derive(Debug, Clone)]
pub struct HandshakeReply {
    pub state: HandshakeState,
    pub packet: Packet,
    pub response: HandshakeResponse,
}

pub struct Handshake {
    state: HandshakeState,
    greeting: HandshakePacket,
    scramble: Option<[u8; SCRAMBLE_LEN]>,
    password: String,
}

impl Handshake {
    /// Prepares a greeting with a fresh scramble and connection id drawn from
    /// `rng`.
    pub fn new<R>(server_version: &str, password: impl Into<String>, rng: &mut R) -> Self
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        let scramble = generate_scramble(rng);
        let connection_id = rng.next_u32();

        Self {
            state: HandshakeState::AwaitingClientResponse,
            greeting: HandshakePacket::new(connection_id, server_version, scramble),
            scramble: Some(scramble),
            password: password.into(),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn connection_id(&self) -> u32 {
        self.greeting.connection_id
    }

    /// The initial handshake packet, always sequence 0.
    pub fn greeting(&self) -> Packet {
        Packet::new(0, self.greeting.encode())
    }

    /// Parses the client's handshake response and verifies its credentials.
    ///
    /// Structural problems in the response are returned as errors and leave
    /// nothing to send. A credential mismatch is not an error here: the reply
    /// carries an access-denied ERR packet and the `Rejected` state. The
    /// scramble is consumed by the first call; later calls fail.
    pub fn handle_response(&mut self, packet: &Packet) -> Result<HandshakeReply> {
        if self.state != HandshakeState::AwaitingClientResponse {
            return Err(ProxyError::InvalidHandshake(format!(
                "handshake already finished: {:?}",
                self.state
            )));
        }
        let scramble = self.scramble.take().ok_or_else(|| {
            ProxyError::InvalidHandshake("scramble already consumed".to_string())
        })?;

        let response = HandshakeResponse::decode(&packet.payload)?;
        let sequence_id = packet.sequence_id.wrapping_add(1);

        debug!(
            connection_id = self.connection_id(),
            username = %response.username,
            database = ?response.database,
            plugin = ?response.auth_plugin_name,
            "handshake response received"
        );

        let (state, payload) =
            if verify_native_password(&response.auth_response, &self.password, &scramble) {
                (
                    HandshakeState::Authenticated,
                    OkPacket::new(0, 0, SERVER_STATUS_AUTOCOMMIT).encode(),
                )
            } else {
                warn!(
                    connection_id = self.connection_id(),
                    username = %response.username,
                    "access denied"
                );
                (
                    HandshakeState::Rejected,
                    ErrPacket::access_denied(&response.username).encode(),
                )
            };

        self.state = state;

        Ok(HandshakeReply {
            state,
            packet: Packet::new(sequence_id, payload),
            response,
        })
    }

    /// Runs the whole exchange over a blocking stream: greeting out, one
    /// response in, OK or ERR out.
    pub fn run<S: Read + Write>(&mut self, stream: &mut S) -> Result<HandshakeReply> {
        self.greeting().write_to(stream)?;
        let packet = Packet::read_from(stream)?;
        let reply = self.handle_response(&packet)?;
        reply.packet.write_to(stream)?;
        Ok(reply)
    }
}

/// Draws a 20-byte scramble. Bytes are kept in 1..=127 and never `$`, as
/// MySQL servers do, since some clients read the second half as a C string.
fn generate_scramble<R: RngCore + ?Sized>(rng: &mut R) -> [u8; SCRAMBLE_LEN] {
    let mut scramble = [0u8; SCRAMBLE_LEN];
    rng.fill_bytes(&mut scramble);
    for b in scramble.iter_mut() {
        *b &= 0x7f;
        if *b == 0 || *b == b'$' {
            *b += 1;
        }
    }
    scramble
}
