//! Service configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

/// Logging output format
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Login sessions database
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Database {
    /// In-memory database, lost on restart
    Memory {
        #[serde(default = "Database::default_max_connections")]
        max_connections: u32,
    },
    /// SQLite database file
    Sqlite {
        path: PathBuf,
        #[serde(default = "Database::default_max_connections")]
        max_connections: u32,
        /// Run migrations on startup
        #[serde(default)]
        migrate: bool,
    },
}

impl Database {
    fn default_max_connections() -> u32 {
        4
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::Memory {
            max_connections: Self::default_max_connections(),
        }
    }
}

/// Stale sessions removal
#[derive(Debug, Clone, Deserialize)]
pub struct Cleanup {
    /// Seconds between cleanups
    #[serde(default = "Cleanup::default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds a session is kept without being updated
    #[serde(default = "Cleanup::default_retention_secs")]
    pub retention_secs: u64,
}

impl Cleanup {
    fn default_interval_secs() -> u64 {
        5 * 60
    }

    fn default_retention_secs() -> u64 {
        30 * 24 * 60 * 60
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for Cleanup {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            retention_secs: Self::default_retention_secs(),
        }
    }
}

/// Top level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address where to host the service
    #[serde(default = "Config::default_host")]
    pub host: SocketAddr,

    /// Enables GraphiQL endpoint
    #[serde(default)]
    pub graphiql: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,

    /// Database configuration
    #[serde(default)]
    pub db: Database,

    /// Cleanup configuration
    #[serde(default)]
    pub cleanup: Cleanup,
}

impl Config {
    fn default_host() -> SocketAddr {
        ([127, 0, 0, 1], 3030).into()
    }
}
