use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{ProxyError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "proxy_config.json";

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub server_version: String,
    /// Password every client must present. Never logged.
    #[serde(skip_serializing)]
    pub password: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3306".to_string(),
            server_version: "metal-db-proxy-1.0".to_string(),
            password: "password".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("server_version", &self.server_version)
            .field("password", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Loads the config file named by `PROXY_CONFIG` (or the default path)
    /// if it exists, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PROXY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file_or_default(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(ProxyError::Config(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| ProxyError::Config(e.to_string()))
    }

    /// Overrides fields from `lookup`, normally the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("PROXY_LISTEN_ADDR") {
            self.listen_addr = addr;
        }

        if let Some(version) = lookup("PROXY_SERVER_VERSION") {
            self.server_version = version;
        }

        if let Some(password) = lookup("PROXY_PASSWORD") {
            self.password = password;
        }

        if let Some(level) = lookup("PROXY_LOG_LEVEL") {
            self.log_level = level;
        }
    }
}
