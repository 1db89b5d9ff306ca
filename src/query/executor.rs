use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::mysql::packet::OkPacket;
use crate::mysql::protocol::SERVER_STATUS_AUTOCOMMIT;
use super::{QueryError, QueryExecutor};

/// Placeholder backend: every statement succeeds with an empty OK.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkExecutor;

#[async_trait]
impl QueryExecutor for OkExecutor {
    async fn execute(&self, statement: &str) -> Result<Bytes, QueryError> {
        debug!(statement = statement.trim(), "answering with OK");
        Ok(OkPacket::new(0, 0, SERVER_STATUS_AUTOCOMMIT).encode())
    }
}
