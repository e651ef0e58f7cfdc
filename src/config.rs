//! Configuration for logbook

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::LogbookError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logbook")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Database file name, relative to `storage_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Whether anyone may create an account
    #[serde(default)]
    pub allow_registration: bool,

    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: u32,
}

fn default_database_file() -> String {
    "logbook.db".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_session_ttl_days() -> u32 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            database_file: default_database_file(),
            listen_address: default_listen_address(),
            allow_registration: false,
            session_ttl_days: default_session_ttl_days(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LogbookError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| LogbookError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LogbookError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LogbookError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where a generated default config is written
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join(&self.database_file)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, LogbookError> {
        self.listen_address.parse().map_err(|e| {
            LogbookError::Config(format!("invalid listen_address {:?}: {}", self.listen_address, e))
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::days(i64::from(self.session_ttl_days))
    }
}
