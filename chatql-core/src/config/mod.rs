//! Configuration management for ChatQL
//!
//! Configuration comes from defaults, a TOML file, or `CHATQL_*` environment
//! variables, and is validated before use.

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Store configuration
    pub store: StoreConfig,

    /// Token and origin configuration
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a writer waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,

    /// Enable WAL (Write-Ahead Log)
    pub enable_wal: bool,
}

/// Token and origin configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign credentials
    pub secret_key: String,

    /// Lifetime of access credentials
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,

    /// Lifetime of refresh credentials
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,

    /// Prefixes an authentication return URL must start with
    pub allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/chatql.db"),
            pool_size: 16,
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: "change-me-in-production".to_string(),
            access_token_ttl: Duration::from_secs(30 * 60),
            refresh_token_ttl: Duration::from_secs(60 * 60),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: CHATQL_<SECTION>_<KEY>
    /// Example: CHATQL_SERVER_BIND_ADDRESS=0.0.0.0:8080
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server config
        if let Some(addr) = lookup("CHATQL_SERVER_BIND_ADDRESS") {
            config.server.bind_address = addr
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid bind address: {}", e)))?;
        }
        if let Some(secs) = lookup("CHATQL_SERVER_SHUTDOWN_TIMEOUT_SECS") {
            config.server.shutdown_timeout = parse_secs(&secs, "shutdown timeout")?;
        }

        // Store config
        if let Some(path) = lookup("CHATQL_STORE_DATABASE_PATH") {
            config.store.database_path = PathBuf::from(path);
        }
        if let Some(size) = lookup("CHATQL_STORE_POOL_SIZE") {
            config.store.pool_size = size
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid pool size: {}", e)))?;
        }
        if let Some(enable_wal) = lookup("CHATQL_STORE_ENABLE_WAL") {
            config.store.enable_wal = enable_wal
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid WAL flag: {}", e)))?;
        }

        // Auth config
        if let Some(secret) = lookup("CHATQL_AUTH_SECRET_KEY") {
            config.auth.secret_key = secret;
        }
        if let Some(secs) = lookup("CHATQL_AUTH_ACCESS_TOKEN_TTL_SECS") {
            config.auth.access_token_ttl = parse_secs(&secs, "access token ttl")?;
        }
        if let Some(secs) = lookup("CHATQL_AUTH_REFRESH_TOKEN_TTL_SECS") {
            config.auth.refresh_token_ttl = parse_secs(&secs, "refresh token ttl")?;
        }
        if let Some(origins) = lookup("CHATQL_AUTH_ALLOWED_ORIGINS") {
            config.auth.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Logging config
        if let Some(level) = lookup("CHATQL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = lookup("CHATQL_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate store config
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        // Validate auth config
        if self.auth.secret_key.is_empty() {
            return Err(ConfigError::ValidationFailed("secret_key must be set".to_string()));
        }

        if self.auth.access_token_ttl.is_zero() || self.auth.refresh_token_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "token lifetimes must be greater than 0".to_string(),
            ));
        }

        if self.auth.allowed_origins.iter().any(|origin| origin.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "allowed_origins must not contain empty entries".to_string(),
            ));
        }

        // Validate logging config
        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn parse_secs(value: &str, what: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e)))
}
