use bytes::{BufMut, BytesMut};

use crate::error::{ProxyError, Result};

// MySQL Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    InitDb,
    Query,
    Ping,
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            COM_QUIT => Command::Quit,
            COM_INIT_DB => Command::InitDb,
            COM_QUERY => Command::Query,
            COM_PING => Command::Ping,
            b => Command::Unknown(b),
        }
    }
}

pub const COM_QUIT: u8 = 0x01;
pub const COM_INIT_DB: u8 = 0x02;
pub const COM_QUERY: u8 = 0x03;
pub const COM_PING: u8 = 0x0e;

pub const PROTOCOL_VERSION: u8 = 10;
pub const AUTH_PLUGIN_NAME: &str = "mysql_native_password";

// MySQL Capability Flags
pub const CLIENT_LONG_PASSWORD: u32 = 0x00000001;
pub const CLIENT_FOUND_ROWS: u32 = 0x00000002;
pub const CLIENT_LONG_FLAG: u32 = 0x00000004;
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x00000008;
pub const CLIENT_COMPRESS: u32 = 0x00000020;
pub const CLIENT_PROTOCOL_41: u32 = 0x00000200;
pub const CLIENT_SSL: u32 = 0x00000800;
pub const CLIENT_TRANSACTIONS: u32 = 0x00002000;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x00008000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x00080000;
pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x00200000;

// Server capability flags. Compression and SSL are never offered.
pub fn server_capabilities() -> u32 {
    CLIENT_LONG_PASSWORD
        | CLIENT_FOUND_ROWS
        | CLIENT_LONG_FLAG
        | CLIENT_CONNECT_WITH_DB
        | CLIENT_PROTOCOL_41
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_PLUGIN_AUTH
}

// Character set
pub const UTF8_GENERAL_CI: u8 = 33;

// Status flags
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

// Error codes and SQL states
pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
pub const ER_UNKNOWN_COM_ERROR: u16 = 1047;
pub const ER_PARSE_ERROR: u16 = 1064;
pub const ER_UNKNOWN_ERROR: u16 = 1105;
pub const SQLSTATE_GENERAL: &str = "HY000";
pub const SQLSTATE_ACCESS_DENIED: &str = "28000";
pub const SQLSTATE_UNKNOWN_COMMAND: &str = "08S01";
pub const SQLSTATE_SYNTAX_ERROR: &str = "42000";

/// Leading byte of a length-encoded NULL.
pub const LENENC_NULL: u8 = 0xfb;

// Helper functions for length-encoded integers
pub fn write_lenenc_int(buf: &mut BytesMut, value: u64) {
    if value < 251 {
        buf.put_u8(value as u8);
    } else if value < 65536 {
        buf.put_u8(0xfc);
        buf.put_u16_le(value as u16);
    } else if value < 16777216 {
        buf.put_u8(0xfd);
        buf.put_uint_le(value, 3);
    } else {
        buf.put_u8(0xfe);
        buf.put_u64_le(value);
    }
}

pub fn write_lenenc_str(buf: &mut BytesMut, s: &[u8]) {
    write_lenenc_int(buf, s.len() as u64);
    buf.put_slice(s);
}

pub fn write_null_terminated_str(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// Reads a little-endian unsigned integer of `width` bytes (at most 8) from
/// the start of `data`.
pub fn read_fixed_int(data: &[u8], width: usize) -> Option<u64> {
    if width > 8 || data.len() < width {
        return None;
    }
    Some(
        data[..width]
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
    )
}

/// Decodes a length-encoded integer from the start of `data`.
///
/// Returns the value (`None` for the NULL sentinel `0xFB`) and the number of
/// bytes consumed. Non-minimal encodings are accepted.
pub fn read_lenenc_int(data: &[u8]) -> Result<(Option<u64>, usize)> {
    let first = *data.first().ok_or(ProxyError::MalformedInt)?;
    let rest = &data[1..];

    let (value, width) = match first {
        0x00..=0xfa => return Ok((Some(first as u64), 1)),
        LENENC_NULL => return Ok((None, 1)),
        0xfc => (read_fixed_int(rest, 2), 2),
        0xfd => (read_fixed_int(rest, 3), 3),
        0xfe => (read_fixed_int(rest, 8), 8),
        _ => (None, 0),
    };

    value
        .map(|v| (Some(v), 1 + width))
        .ok_or(ProxyError::MalformedInt)
}

/// Decodes a null-terminated string from the start of `data`. The consumed
/// count includes the terminator.
pub fn read_null_terminated_string(data: &[u8]) -> Result<(String, usize)> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(ProxyError::MalformedString)?;
    Ok((String::from_utf8_lossy(&data[..end]).into_owned(), end + 1))
}
