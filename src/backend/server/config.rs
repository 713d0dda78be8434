/**
 * Server Configuration
 *
 * Settings are read from environment variables (after `dotenv`), optionally
 * layered over a TOML file named by `XFCANVAS_CONFIG`. Environment values
 * always win over the file.
 *
 * # Variables
 *
 * | Variable              | Default | Meaning                                  |
 * |-----------------------|---------|------------------------------------------|
 * | `SERVER_PORT`         | 3000    | Listen port                              |
 * | `DATABASE_URL`        | unset   | Postgres URL; in-memory store when unset |
 * | `JWT_SECRET`          | -       | Token signing secret                     |
 * | `AUTH_DISABLED`       | false   | Skip token checks                        |
 * | `BROADCAST_CAPACITY`  | 256     | Per-workspace push buffer                |
 * | `PERSIST_QUEUE_DEPTH` | 1       | Pending persistence passes per workspace |
 * | `SWEEP_INTERVAL_SECS` | 60      | Persistence and eviction sweep period    |
 * | `IDLE_TIMEOUT_SECS`   | 600     | Idle time before an unwatched eviction   |
 * | `CORS_ORIGINS`        | any     | Comma-separated allowed origins          |
 */

use crate::backend::collab::{HubConfig, RoomSettings};
use crate::backend::persistence::PersistenceError;
use crate::shared::ConfigError;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an optional TOML config file
pub const CONFIG_FILE_VAR: &str = "XFCANVAS_CONFIG";

/// Resolved server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub auth_disabled: bool,
    pub broadcast_capacity: usize,
    pub persist_queue_depth: usize,
    pub sweep_interval: Duration,
    pub idle_timeout: Duration,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            jwt_secret: String::new(),
            auth_disabled: false,
            broadcast_capacity: 256,
            persist_queue_depth: 1,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
            cors_origins: Vec::new(),
        }
    }
}

/// Contents of the optional TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub auth_disabled: Option<bool>,
    pub broadcast_capacity: Option<usize>,
    pub persist_queue_depth: Option<usize>,
    pub sweep_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub cors_origins: Option<Vec<String>>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::File(e.to_string()))
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

impl ServerConfig {
    /// Load from the process environment and the optional config file
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var(CONFIG_FILE_VAR) {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::File(format!("{}: {}", path, e)))?;
                FileConfig::parse(&contents)?
            }
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge file values with variables from `lookup`
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("SERVER_PORT") {
            Some(value) => parse_var("SERVER_PORT", value)?,
            None => file.port.unwrap_or(defaults.port),
        };
        let database_url = lookup("DATABASE_URL")
            .or(file.database_url)
            .filter(|url| !url.trim().is_empty());
        let auth_disabled = match lookup("AUTH_DISABLED") {
            Some(value) => parse_bool("AUTH_DISABLED", value)?,
            None => file.auth_disabled.unwrap_or(defaults.auth_disabled),
        };
        let jwt_secret = lookup("JWT_SECRET")
            .or(file.jwt_secret)
            .filter(|secret| !secret.is_empty())
            .unwrap_or_default();
        if jwt_secret.is_empty() && !auth_disabled {
            return Err(ConfigError::MissingValue("JWT_SECRET"));
        }
        let broadcast_capacity = match lookup("BROADCAST_CAPACITY") {
            Some(value) => parse_var("BROADCAST_CAPACITY", value)?,
            None => file.broadcast_capacity.unwrap_or(defaults.broadcast_capacity),
        };
        let persist_queue_depth = match lookup("PERSIST_QUEUE_DEPTH") {
            Some(value) => parse_var("PERSIST_QUEUE_DEPTH", value)?,
            None => file.persist_queue_depth.unwrap_or(defaults.persist_queue_depth),
        };
        let sweep_interval = match lookup("SWEEP_INTERVAL_SECS") {
            Some(value) => Duration::from_secs(parse_var("SWEEP_INTERVAL_SECS", value)?),
            None => file
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        };
        let idle_timeout = match lookup("IDLE_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_var("IDLE_TIMEOUT_SECS", value)?),
            None => file
                .idle_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
        };
        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            None => file.cors_origins.unwrap_or_default(),
        };

        let config = Self {
            port,
            database_url,
            jwt_secret,
            auth_disabled,
            broadcast_capacity,
            persist_queue_depth,
            sweep_interval,
            idle_timeout,
            cors_origins,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BROADCAST_CAPACITY",
                value: "0".to_string(),
            });
        }
        if self.persist_queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PERSIST_QUEUE_DEPTH",
                value: "0".to_string(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Hub settings derived from this config
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            room: RoomSettings {
                broadcast_capacity: self.broadcast_capacity,
                persist_queue_depth: self.persist_queue_depth,
            },
            idle_timeout: self.idle_timeout,
        }
    }
}

/// How long startup waits for the configured database
pub const DATABASE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect to Postgres and run migrations
///
/// Returns `None` when no URL is configured; the server then keeps
/// workspaces in the in-memory store. A configured database that cannot be
/// reached or migrated is an error.
pub async fn load_database(database_url: Option<&str>) -> Result<Option<PgPool>, PersistenceError> {
    let Some(database_url) = database_url else {
        tracing::warn!("DATABASE_URL not set. Workspaces will only be kept in memory.");
        return Ok(None);
    };
    connect_database(database_url, DATABASE_CONNECT_TIMEOUT).await.map(Some)
}

async fn connect_database(database_url: &str, timeout: Duration) -> Result<PgPool, PersistenceError> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .acquire_timeout(timeout)
        .connect(database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create database connection pool: {:?}", e);
            PersistenceError::from(e)
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!().run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        PersistenceError::unavailable(format!("migrations failed: {}", e))
    })?;
    tracing::info!("Database migrations completed successfully");

    Ok(pool)
}
