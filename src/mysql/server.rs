use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::query::QueryExecutor;
use super::connection::MysqlConnection;

pub struct MysqlServer {
    listener: TcpListener,
    config: Arc<Config>,
    query_executor: Arc<dyn QueryExecutor>,
}

impl MysqlServer {
    pub async fn bind(config: Arc<Config>, query_executor: Arc<dyn QueryExecutor>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self {
            listener,
            config,
            query_executor,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` resolves. Each connection runs
    /// on its own task and is not waited for.
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("MySQL server listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("accept loop stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!(remote = %addr, "accepted connection");

                        let conn = MysqlConnection::new(
                            stream,
                            self.config.clone(),
                            self.query_executor.clone(),
                        );

                        tokio::spawn(async move {
                            match conn.handle().await {
                                Ok(()) => info!(remote = %addr, "connection closed"),
                                Err(ProxyError::AuthFailed(user)) => {
                                    warn!(remote = %addr, user = %user, "authentication failed, connection closed")
                                }
                                Err(e) => error!(remote = %addr, error = %e, "connection error"),
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }
}
