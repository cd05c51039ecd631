//! Database configuration.
//!
//! Configuration is an explicit value handed to [`crate::store::PostgresStore::connect`];
//! nothing here is process-global. It can be built from:
//!
//! - `Default` (local development database),
//! - environment variables ([`DatabaseConfig::from_env`]),
//! - a `postgres://` URL ([`DatabaseConfig::from_url`]),
//! - any serde source (the struct is `Deserialize` with per-field defaults).
//!
//! ## Environment variables
//!
//! | variable | field |
//! |---|---|
//! | `DATABASE_URL` | `url` (takes precedence over the split host/port/... fields) |
//! | `BOOKSTORE_DB_HOST` | `host` |
//! | `BOOKSTORE_DB_PORT` | `port` |
//! | `BOOKSTORE_DB_NAME` | `database` |
//! | `BOOKSTORE_DB_USER` | `user` |
//! | `BOOKSTORE_DB_PASSWORD` | `password` |
//! | `BOOKSTORE_DB_MAX_CONNECTIONS` | `max_connections` |
//! | `BOOKSTORE_DB_ACQUIRE_TIMEOUT_SECS` | `acquire_timeout_secs` |
//! | `BOOKSTORE_DB_STATEMENT_TIMEOUT_MS` | `statement_timeout_ms` |
//! | `BOOKSTORE_DB_ISOLATION` | `isolation` (`read_committed`, `repeatable_read`, `serializable`) |

use core::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use thiserror::Error;

use crate::store::{StoreError, map_sqlx_error};

/// Configuration error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        StoreError::Storage(value.to_string())
    }
}

/// Transaction isolation level used for order placement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Row locks (`SELECT ... FOR UPDATE`) carry correctness; conflicts block instead of failing.
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Statement that must run first inside a fresh transaction.
    pub fn set_transaction_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(ConfigError::InvalidValue {
                key: "BOOKSTORE_DB_ISOLATION",
                value: s.to_string(),
                reason: "expected read_committed, repeatable_read or serializable".to_string(),
            }),
        }
    }
}

/// Connection and transaction settings for the Postgres store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; when set, `host`/`port`/`database`/`user`/`password` are ignored.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Per-transaction `statement_timeout`; `None` keeps the server default.
    pub statement_timeout_ms: Option<u64>,
    pub isolation: IsolationLevel,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "learning_db".to_string(),
            user: "learner".to_string(),
            password: String::new(),
            max_connections: 5,
            acquire_timeout_secs: 5,
            statement_timeout_ms: None,
            isolation: IsolationLevel::default(),
        }
    }
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("isolation", &self.isolation)
            .finish()
    }
}

impl DatabaseConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("DATABASE_URL") {
            Some(url) => Self::from_url(&url)?,
            None => Self::default(),
        };

        if let Some(host) = lookup("BOOKSTORE_DB_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("BOOKSTORE_DB_PORT") {
            config.port = parse_number("BOOKSTORE_DB_PORT", &port)?;
        }
        if let Some(database) = lookup("BOOKSTORE_DB_NAME") {
            config.database = database;
        }
        if let Some(user) = lookup("BOOKSTORE_DB_USER") {
            config.user = user;
        }
        if let Some(password) = lookup("BOOKSTORE_DB_PASSWORD") {
            config.password = password;
        }
        if let Some(max) = lookup("BOOKSTORE_DB_MAX_CONNECTIONS") {
            config.max_connections = parse_number("BOOKSTORE_DB_MAX_CONNECTIONS", &max)?;
        }
        if let Some(secs) = lookup("BOOKSTORE_DB_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout_secs = parse_number("BOOKSTORE_DB_ACQUIRE_TIMEOUT_SECS", &secs)?;
        }
        if let Some(ms) = lookup("BOOKSTORE_DB_STATEMENT_TIMEOUT_MS") {
            config.statement_timeout_ms =
                Some(parse_number("BOOKSTORE_DB_STATEMENT_TIMEOUT_MS", &ms)?);
        }
        if let Some(level) = lookup("BOOKSTORE_DB_ISOLATION") {
            config.isolation = level.parse()?;
        }

        if config.url.is_none() && config.password.is_empty() {
            tracing::warn!("BOOKSTORE_DB_PASSWORD not set; connecting without a password");
        }
        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BOOKSTORE_DB_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "pool needs at least one connection".to_string(),
            });
        }

        Ok(config)
    }

    /// Configuration pointing at a `postgres://` URL, with default pool settings.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ConfigError::InvalidUrl(
                "expected a postgres:// or postgresql:// url".to_string(),
            ));
        }
        PgConnectOptions::from_str(url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            url: Some(url.to_string()),
            ..Self::default()
        })
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url)
                .map_err(|e| ConfigError::InvalidUrl(e.to_string()));
        }
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        Ok(options)
    }

    /// Open a connection pool with at least one connection established.
    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        let options = self.connect_options()?;
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
