//! Configuration management
//!
//! Everything is read from the environment (a `.env` file is honoured) once at
//! startup. Unparseable numbers fall back to their defaults; combinations that
//! cannot work are rejected by [`Config::validate`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ingest::{ApplyMode, PipelineConfig, StagingBackend};
use crate::storage::config::StorageConfig;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 64 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Local operator console
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    /// Absent when `DATABASE_URL` is unset; the apply step is then remote only
    pub database: Option<DatabaseConfig>,
    pub cors: CorsConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body; bigger uploads get 413
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    fn from_env(url: String) -> Self {
        Self {
            url,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
            min_connections: env_parse("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
            connect_timeout_secs: env_parse(
                "DATABASE_CONNECT_TIMEOUT",
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            ),
            idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// `*` or an empty list allows any origin, without credentials
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("BULKREC_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_parse("BULKREC_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "BULKREC_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
                max_upload_bytes: env_parse("BULKREC_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            },
            database: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.trim().is_empty())
                .map(DatabaseConfig::from_env),
            cors: CorsConfig {
                allowed_origins: split_list(
                    &std::env::var("CORS_ALLOWED_ORIGINS")
                        .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string()),
                ),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", true),
            },
            storage: StorageConfig::from_env()?,
            pipeline: PipelineConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Reject settings that cannot work together
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("BULKREC_MAX_UPLOAD_BYTES must be greater than 0");
        }

        if let Some(database) = &self.database {
            if database.max_connections == 0 {
                anyhow::bail!("Database max_connections must be greater than 0");
            }

            if database.min_connections > database.max_connections {
                anyhow::bail!(
                    "Database min_connections ({}) cannot be greater than max_connections ({})",
                    database.min_connections,
                    database.max_connections
                );
            }
        } else if self.pipeline.apply_mode == ApplyMode::Inline {
            anyhow::bail!("INGEST_APPLY_MODE=inline requires DATABASE_URL");
        }

        self.pipeline.validate()?;

        if self.pipeline.staging_backend == StagingBackend::Memory && self.database.is_some() {
            tracing::warn!(
                "Memory staging selected; /api/v1/apply can only read chunks staged by this process"
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured; any origin will be allowed");
        }

        Ok(())
    }
}

/// Parsed value of `key`, or `default` when unset or unparseable
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list with blanks dropped
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            database: None,
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            storage: StorageConfig::for_minio("http://localhost:9000", "bulkrec-staging"),
            pipeline: PipelineConfig::default(),
        }
    }
}
