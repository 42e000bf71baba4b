//! Pipeline configuration
//!
//! One [`PipelineConfig`] is loaded at startup and handed to every job. A job
//! may narrow it through [`JobOverrides`] (currently the chunk ceiling and a
//! declared encoding) without touching the shared copy.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use super::error::IngestError;
use crate::config::{env_parse, split_list};
use super::normalizer::{EncodingPolicy, DEFAULT_ENCODINGS};

pub const DEFAULT_CHUNK_SIZE: usize = 8000;
pub const DEFAULT_STAGING_PREFIX: &str = "staging";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_STAGE_MAX_RETRIES: u32 = 2;
pub const DEFAULT_STAGE_RETRY_BASE_MS: u64 = 500;
pub const DEFAULT_APPLY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_INTER_CHUNK_DELAY_MS: u64 = 1000;
pub const DEFAULT_APPLY_BATCH_SIZE: usize = 500;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 900;
pub const DEFAULT_SWEEP_MAX_AGE_SECS: u64 = 3600;

/// Where the apply step runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// POST to an external apply endpoint
    Remote,
    /// Run the apply service in this process against the local database
    Inline,
}

impl FromStr for ApplyMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(ApplyMode::Remote),
            "inline" => Ok(ApplyMode::Inline),
            other => Err(IngestError::InvalidOption(format!(
                "apply mode must be 'remote' or 'inline', got '{}'",
                other
            ))),
        }
    }
}

/// Backing store for staged chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingBackend {
    S3,
    /// Process-local; only meaningful when the apply step runs inline
    Memory,
}

impl FromStr for StagingBackend {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(StagingBackend::S3),
            "memory" => Ok(StagingBackend::Memory),
            other => Err(IngestError::InvalidOption(format!(
                "staging backend must be 's3' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum rows per chunk
    pub chunk_size: usize,
    /// Encoding labels, tried in order
    pub encodings: Vec<String>,
    pub staging_prefix: String,
    pub staging_backend: StagingBackend,
    pub stage_timeout_secs: u64,
    /// Additional staging attempts after the first failure
    pub stage_max_retries: u32,
    pub stage_retry_base_ms: u64,
    pub apply_mode: ApplyMode,
    pub apply_url: Option<String>,
    pub apply_timeout_secs: u64,
    /// Rows per upsert statement inside the apply service
    pub apply_batch_size: usize,
    pub inter_chunk_delay_ms: u64,
    pub sweep_interval_secs: u64,
    pub sweep_max_age_secs: u64,
}

impl PipelineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let config = Self {
            chunk_size: env_parse("INGEST_CHUNK_SIZE", defaults.chunk_size),
            encodings: std::env::var("INGEST_ENCODINGS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.encodings),
            staging_prefix: std::env::var("INGEST_STAGING_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.staging_prefix),
            staging_backend: match std::env::var("INGEST_STAGING_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.staging_backend,
            },
            stage_timeout_secs: env_parse("INGEST_STAGE_TIMEOUT_SECS", defaults.stage_timeout_secs),
            stage_max_retries: env_parse("INGEST_STAGE_MAX_RETRIES", defaults.stage_max_retries),
            stage_retry_base_ms: env_parse("INGEST_STAGE_RETRY_BASE_MS", defaults.stage_retry_base_ms),
            apply_mode: match std::env::var("INGEST_APPLY_MODE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.apply_mode,
            },
            apply_url: std::env::var("INGEST_APPLY_URL").ok().filter(|u| !u.trim().is_empty()),
            apply_timeout_secs: env_parse("INGEST_APPLY_TIMEOUT_SECS", defaults.apply_timeout_secs),
            apply_batch_size: env_parse("INGEST_APPLY_BATCH_SIZE", defaults.apply_batch_size),
            inter_chunk_delay_ms: env_parse(
                "INGEST_INTER_CHUNK_DELAY_MS",
                defaults.inter_chunk_delay_ms,
            ),
            sweep_interval_secs: env_parse("INGEST_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs),
            sweep_max_age_secs: env_parse("INGEST_SWEEP_MAX_AGE_SECS", defaults.sweep_max_age_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("INGEST_CHUNK_SIZE must be greater than 0");
        }

        EncodingPolicy::from_labels(&self.encodings)?;

        if self.staging_prefix.is_empty() {
            anyhow::bail!("INGEST_STAGING_PREFIX cannot be empty");
        }

        if self.apply_batch_size == 0 {
            anyhow::bail!("INGEST_APPLY_BATCH_SIZE must be greater than 0");
        }

        match self.apply_mode {
            ApplyMode::Remote if self.apply_url.is_none() => {
                anyhow::bail!("INGEST_APPLY_URL is required when INGEST_APPLY_MODE=remote");
            },
            ApplyMode::Remote if self.staging_backend == StagingBackend::Memory => {
                anyhow::bail!("Memory staging cannot be read by a remote apply service");
            },
            _ => {},
        }

        if self.stage_timeout_secs == 0 || self.apply_timeout_secs == 0 {
            anyhow::bail!("Stage and apply timeouts must be greater than 0");
        }

        Ok(())
    }

    pub fn encoding_policy(&self) -> Result<EncodingPolicy, IngestError> {
        EncodingPolicy::from_labels(&self.encodings)
    }

    /// Copy of this configuration with per-job overrides applied
    pub fn with_overrides(&self, overrides: &JobOverrides) -> Result<Self, IngestError> {
        let mut config = self.clone();
        if let Some(chunk_size) = overrides.chunk_size {
            if chunk_size == 0 {
                return Err(IngestError::InvalidOption(
                    "chunk_size must be at least 1".to_string(),
                ));
            }
            config.chunk_size = chunk_size;
        }
        Ok(config)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn stage_retry_base(&self) -> Duration {
        Duration::from_millis(self.stage_retry_base_ms)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }

    pub fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_secs(self.sweep_max_age_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            encodings: DEFAULT_ENCODINGS.iter().map(|s| s.to_string()).collect(),
            staging_prefix: DEFAULT_STAGING_PREFIX.to_string(),
            staging_backend: StagingBackend::S3,
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            stage_max_retries: DEFAULT_STAGE_MAX_RETRIES,
            stage_retry_base_ms: DEFAULT_STAGE_RETRY_BASE_MS,
            apply_mode: ApplyMode::Remote,
            apply_url: None,
            apply_timeout_secs: DEFAULT_APPLY_TIMEOUT_SECS,
            apply_batch_size: DEFAULT_APPLY_BATCH_SIZE,
            inter_chunk_delay_ms: DEFAULT_INTER_CHUNK_DELAY_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_max_age_secs: DEFAULT_SWEEP_MAX_AGE_SECS,
        }
    }
}

/// Per-job knobs supplied with a submission
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobOverrides {
    pub chunk_size: Option<usize>,
    /// Encoding label to try before the configured list
    pub encoding: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn remote() -> PipelineConfig {
        PipelineConfig {
            apply_url: Some("http://apply.internal/api/v1/apply".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_size, 8000);
        assert_eq!(config.encodings, vec!["shift_jis", "utf-8"]);
        assert_eq!(config.stage_max_retries, 2);
        assert_eq!(config.inter_chunk_delay(), Duration::from_secs(1));
        assert_eq!(config.apply_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_remote_requires_url() {
        assert!(PipelineConfig::default().validate().is_err());
        assert!(remote().validate().is_ok());
    }

    #[test]
    fn test_memory_staging_requires_inline() {
        let mut config = remote();
        config.staging_backend = StagingBackend::Memory;
        assert!(config.validate().is_err());

        config.apply_mode = ApplyMode::Inline;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let mut config = remote();
        config.encodings = vec!["shift_jis".into(), "not-a-charset".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = remote();
        let narrowed = config
            .with_overrides(&JobOverrides {
                chunk_size: Some(250),
                encoding: None,
            })
            .unwrap();
        assert_eq!(narrowed.chunk_size, 250);
        assert_eq!(config.chunk_size, 8000);

        let zero = JobOverrides {
            chunk_size: Some(0),
            encoding: None,
        };
        assert!(matches!(config.with_overrides(&zero), Err(IngestError::InvalidOption(_))));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("INLINE".parse::<ApplyMode>().unwrap(), ApplyMode::Inline);
        assert_eq!(" s3 ".parse::<StagingBackend>().unwrap(), StagingBackend::S3);
        assert!("lambda".parse::<ApplyMode>().is_err());
    }
}
