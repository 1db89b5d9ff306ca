//! MySQL packet framing and the fixed-layout packets exchanged during
//! connection setup.
//!
//! ```text
//! [3 bytes: payload length]
//! [1 byte: sequence number]
//! [N bytes: payload]
//! ```

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut, Buf};

use crate::error::{ProxyError, Result};
use super::protocol::*;

pub const HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = 0xFFFFFF;
pub const SCRAMBLE_LEN: usize = 20;

/// Size of the fixed region of a HandshakeResponse41 that precedes the
/// username: capability flags (4), max packet size (4), charset (1) and
/// 23 reserved bytes.
pub const HANDSHAKE_RESPONSE_FIXED_LEN: usize = 32;

// MySQL Packet structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: impl Into<Bytes>) -> Self {
        Self { sequence_id, payload: payload.into() }
    }

    /// Header plus payload, ready for a single write. Payloads that do not
    /// fit the 24-bit length field are rejected; splitting is not supported.
    pub fn encode(&self) -> Result<BytesMut> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProxyError::PayloadTooLarge(self.payload.len()));
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());

        // Payload length (3 bytes)
        buf.put_uint_le(self.payload.len() as u64, 3);

        // Sequence ID
        buf.put_u8(self.sequence_id);

        // Payload
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Splits one complete frame off the front of `buf`, or returns `None`
    /// and leaves `buf` untouched if more bytes are needed.
    pub fn decode(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }

        // Read header
        let len = (buf[0] as usize) | ((buf[1] as usize) << 8) | ((buf[2] as usize) << 16);
        let sequence_id = buf[3];

        if buf.len() < HEADER_SIZE + len {
            return None;
        }

        // Remove header
        buf.advance(HEADER_SIZE);

        // Extract payload
        let payload = buf.split_to(len).freeze();

        Some(Packet { sequence_id, payload })
    }

    /// Read a complete packet from a blocking stream.
    ///
    /// A stream that ends before the first header byte yields
    /// [`ProxyError::ConnectionClosed`]; one that ends anywhere later yields
    /// [`ProxyError::TruncatedRead`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_full(reader, &mut header)?;
        if read == 0 {
            return Err(ProxyError::ConnectionClosed);
        }
        if read < HEADER_SIZE {
            return Err(ProxyError::TruncatedRead { expected: HEADER_SIZE, read });
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
        let sequence_id = header[3];

        let mut payload = vec![0u8; len];
        let read = read_full(reader, &mut payload)?;
        if read < len {
            return Err(ProxyError::TruncatedRead { expected: len, read });
        }

        Ok(Self::new(sequence_id, payload))
    }

    /// Write a complete packet to a blocking stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let encoded = self.encode()?;
        writer.write_all(&encoded)?;
        writer.flush()?;
        Ok(())
    }
}

/// Reads until `buf` is full or the stream ends, returning the byte count.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// Handshake packet (Initial handshake from server to client)
#[derive(Debug, Clone)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: [u8; SCRAMBLE_LEN],
    pub capability_flags: u32,
    pub character_set: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

impl HandshakePacket {
    pub fn new(connection_id: u32, server_version: &str, scramble: [u8; SCRAMBLE_LEN]) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            server_version: server_version.to_string(),
            connection_id,
            auth_plugin_data: scramble,
            capability_flags: server_capabilities(),
            character_set: UTF8_GENERAL_CI,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            auth_plugin_name: AUTH_PLUGIN_NAME.to_string(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        // Protocol version
        buf.put_u8(self.protocol_version);

        // Server version
        write_null_terminated_str(&mut buf, &self.server_version);

        // Connection ID
        buf.put_u32_le(self.connection_id);

        // Auth plugin data part 1 (8 bytes)
        buf.put_slice(&self.auth_plugin_data[0..8]);

        // Filler
        buf.put_u8(0);

        // Capability flags (lower 2 bytes)
        buf.put_u16_le((self.capability_flags & 0xffff) as u16);

        // Character set
        buf.put_u8(self.character_set);

        // Status flags
        buf.put_u16_le(self.status_flags);

        // Capability flags (upper 2 bytes)
        buf.put_u16_le(((self.capability_flags >> 16) & 0xffff) as u16);

        // Auth plugin data length, counting the trailing filler
        buf.put_u8(SCRAMBLE_LEN as u8 + 1);

        // Reserved (10 bytes)
        buf.put_bytes(0, 10);

        // Auth plugin data part 2 (12 bytes)
        buf.put_slice(&self.auth_plugin_data[8..SCRAMBLE_LEN]);

        // Filler
        buf.put_u8(0);

        // Auth plugin name
        write_null_terminated_str(&mut buf, &self.auth_plugin_name);

        buf.freeze()
    }

    pub fn salt(&self) -> &[u8] {
        &self.auth_plugin_data
    }
}

// Handshake Response (from client)
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin_name: Option<String>,
}

impl HandshakeResponse {
    /// Parses a HandshakeResponse41 payload.
    ///
    /// Clients that did not negotiate `CLIENT_PROTOCOL_41` use the short
    /// legacy layout and are rejected instead of being parsed at the 4.1
    /// offsets.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < HANDSHAKE_RESPONSE_FIXED_LEN {
            return Err(ProxyError::InvalidHandshake(format!(
                "handshake response too short: {} bytes",
                payload.len()
            )));
        }

        let mut fixed = &payload[..HANDSHAKE_RESPONSE_FIXED_LEN];
        let capability_flags = fixed.get_u32_le();
        let max_packet_size = fixed.get_u32_le();
        let character_set = fixed.get_u8();

        if capability_flags & CLIENT_PROTOCOL_41 == 0 {
            return Err(ProxyError::InvalidHandshake(
                "client did not negotiate protocol 4.1".to_string(),
            ));
        }

        let mut pos = HANDSHAKE_RESPONSE_FIXED_LEN;

        let (username, n) = read_null_terminated_string(&payload[pos..])?;
        pos += n;

        let (auth_len, n) = read_lenenc_int(&payload[pos..])?;
        pos += n;

        let auth_len = auth_len
            .ok_or_else(|| ProxyError::InvalidPacket("NULL auth response length".to_string()))?;
        let remaining = payload.len() - pos;
        let auth_len = usize::try_from(auth_len)
            .ok()
            .filter(|len| *len <= remaining)
            .ok_or_else(|| {
                ProxyError::InvalidPacket(format!(
                    "auth response length {} exceeds remaining {} bytes",
                    auth_len, remaining
                ))
            })?;
        let auth_response = payload[pos..pos + auth_len].to_vec();
        pos += auth_len;

        // Trailing fields do not affect authentication; stop at the first
        // one that cannot be parsed.
        let mut trailing = |flag: u32| -> Option<String> {
            if capability_flags & flag == 0 {
                return None;
            }
            let (value, n) = read_null_terminated_string(payload.get(pos..)?).ok()?;
            pos += n;
            Some(value).filter(|v| !v.is_empty())
        };

        let database = trailing(CLIENT_CONNECT_WITH_DB);
        let auth_plugin_name = trailing(CLIENT_PLUGIN_AUTH);

        Ok(Self {
            capability_flags,
            max_packet_size,
            character_set,
            username,
            auth_response,
            database,
            auth_plugin_name,
        })
    }
}

// OK Packet
#[derive(Debug, Clone, Default)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

impl OkPacket {
    pub fn new(affected_rows: u64, last_insert_id: u64, status_flags: u16) -> Self {
        Self {
            affected_rows,
            last_insert_id,
            status_flags,
            warnings: 0,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        buf.put_u8(0x00); // OK packet header
        write_lenenc_int(&mut buf, self.affected_rows);
        write_lenenc_int(&mut buf, self.last_insert_id);
        buf.put_u16_le(self.status_flags);
        buf.put_u16_le(self.warnings);

        buf.freeze()
    }
}

// Error Packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// `sql_state` must be exactly five characters; it is written verbatim.
    pub fn new(error_code: u16, sql_state: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            sql_state: sql_state.into(),
            error_message: error_message.into(),
        }
    }

    pub fn access_denied(username: &str) -> Self {
        Self::new(
            ER_ACCESS_DENIED_ERROR,
            SQLSTATE_ACCESS_DENIED,
            format!("Access denied for user '{}'", username),
        )
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        buf.put_u8(0xff); // Error packet header
        buf.put_u16_le(self.error_code);
        buf.put_u8(b'#'); // SQL state marker
        buf.put_slice(self.sql_state.as_bytes());
        buf.put_slice(self.error_message.as_bytes());

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_packet_read_write() {
        let payload = Bytes::from_static(b"hello");
        let packet = Packet::new(7, payload.clone());

        let mut buf = Vec::new();
        packet.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[5, 0, 0, 7]);

        let mut cursor = Cursor::new(buf);
        let read_packet = Packet::read_from(&mut cursor).unwrap();

        assert_eq!(read_packet.sequence_id, 7);
        assert_eq!(read_packet.payload, payload);
    }

    #[test]
    fn test_packet_round_trip_sizes_and_sequences() {
        for (len, seq) in [(0usize, 0u8), (1, 255), (250, 1), (70000, 42)] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = Vec::new();
            Packet::new(seq, payload.clone()).write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), HEADER_SIZE + len);

            let packet = Packet::read_from(&mut Cursor::new(buf)).unwrap();
            assert_eq!(packet.sequence_id, seq);
            assert_eq!(&packet.payload[..], &payload[..]);
        }
    }

    #[test]
    fn test_packet_max_payload_round_trip() {
        let payload = vec![0xabu8; MAX_PAYLOAD_LEN];
        let mut buf = Vec::new();
        Packet::new(3, payload).write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0xff, 0xff, 0xff, 3]);

        let packet = Packet::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(packet.payload.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_empty_payload_is_not_eof() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 9]);
        let packet = Packet::read_from(&mut cursor).unwrap();
        assert_eq!(packet.sequence_id, 9);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_payload_too_large() {
        let packet = Packet::new(0, vec![0u8; MAX_PAYLOAD_LEN + 1]);
        let mut buf = Vec::new();
        let err = packet.write_to(&mut buf).unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge(n) if n == MAX_PAYLOAD_LEN + 1));
        assert!(buf.is_empty(), "nothing may be written for an oversized payload");
    }

    #[test]
    fn test_clean_eof_before_header() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            Packet::read_from(&mut cursor),
            Err(ProxyError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_truncated_header() {
        let mut cursor = Cursor::new(vec![5, 0]);
        assert!(matches!(
            Packet::read_from(&mut cursor),
            Err(ProxyError::TruncatedRead { expected: 4, read: 2 })
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let mut cursor = Cursor::new(vec![5, 0, 0, 1, b'h', b'e']);
        assert!(matches!(
            Packet::read_from(&mut cursor),
            Err(ProxyError::TruncatedRead { expected: 5, read: 2 })
        ));
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut buf = BytesMut::from(&[3u8, 0, 0, 2, b'a'][..]);
        assert!(Packet::decode(&mut buf).is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(b"bc");
        buf.extend_from_slice(&[0, 0, 0, 3]);
        let packet = Packet::decode(&mut buf).unwrap();
        assert_eq!(packet.sequence_id, 2);
        assert_eq!(&packet.payload[..], b"abc");

        let empty = Packet::decode(&mut buf).unwrap();
        assert_eq!(empty.sequence_id, 3);
        assert!(empty.payload.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_ok_packet() {
        let payload = OkPacket::new(1, 2, SERVER_STATUS_AUTOCOMMIT).encode();
        assert!(payload.len() >= 7);
        assert_eq!(payload[0], 0x00);
        let n = payload.len();
        assert_eq!(u16::from_le_bytes([payload[n - 4], payload[n - 3]]), 0x0002);
        assert_eq!(&payload[n - 2..], &[0, 0]);
        assert_eq!(&payload[..], &[0x00, 1, 2, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_ok_packet_wide_counts() {
        let payload = OkPacket::new(300, 70000, 0).encode();
        assert_eq!(payload[1], 0xfc);
        assert_eq!(payload[4], 0xfd);
        assert_eq!(payload.len(), 1 + 3 + 4 + 2 + 2);
    }

    #[test]
    fn test_err_packet() {
        let payload = ErrPacket::new(1045, "28000", "Access denied").encode();
        assert_eq!(payload[0], 0xff);
        assert_eq!(u16::from_le_bytes([payload[1], payload[2]]), 1045);
        assert_eq!(payload[3], b'#');
        assert_eq!(&payload[4..9], b"28000");
        assert_eq!(&payload[9..], b"Access denied");
    }

    #[test]
    fn test_access_denied_embeds_username() {
        let payload = ErrPacket::access_denied("alice").encode();
        assert_eq!(&payload[4..9], b"28000");
        assert_eq!(&payload[9..], b"Access denied for user 'alice'");
    }
}
