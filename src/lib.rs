// Library exports for metal-db-proxy
// This allows the binary and integration tests to use the modules

pub mod error;
pub mod config;
pub mod mysql;
pub mod query;

// Re-export commonly used types
pub use error::{ProxyError, Result};
pub use config::Config;
pub use query::{OkExecutor, QueryError, QueryExecutor};
