use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Truncated read: stream ended after {read} of {expected} bytes")]
    TruncatedRead { expected: usize, read: usize },

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Malformed length-encoded integer")]
    MalformedInt,

    #[error("Malformed null-terminated string")]
    MalformedString,

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    #[error("Authentication failed for user '{0}'")]
    AuthFailed(String),

    #[error("Unsupported command: 0x{0:02x}")]
    UnsupportedCommand(u8),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Errors caused by malformed peer input, answerable with an ERR packet
    /// once the session is established.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            ProxyError::MalformedInt | ProxyError::MalformedString | ProxyError::InvalidPacket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
