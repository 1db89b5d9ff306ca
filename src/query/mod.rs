mod executor;

pub use executor::OkExecutor;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::mysql::protocol::{ER_PARSE_ERROR, SQLSTATE_SYNTAX_ERROR};

/// Failure reported by a query backend. The session wraps it into an ERR
/// packet unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code}/{sql_state})")]
pub struct QueryError {
    pub code: u16,
    pub sql_state: String,
    pub message: String,
}

impl QueryError {
    pub fn new(code: u16, sql_state: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: sql_state.into(),
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ER_PARSE_ERROR, SQLSTATE_SYNTAX_ERROR, message)
    }
}

/// Statement execution backend used by `COM_QUERY`.
///
/// The returned bytes are a complete response payload (OK, ERR or anything
/// else the client expects) and are forwarded without inspection.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<Bytes, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_syntax_defaults() {
        let err = QueryError::syntax("near 'SELEC'");
        assert_eq!(err.code, 1064);
        assert_eq!(err.sql_state, "42000");
        assert_eq!(err.to_string(), "near 'SELEC' (1064/42000)");
    }
}
