//! Configuration for kvlink
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{KvError, Result};
use crate::retry::Backoff;

/// Environment variable overriding [`Config::cas_retry_limit`]
pub const CAS_RETRY_LIMIT_ENV: &str = "KVLINK_CAS_RETRY_LIMIT";

/// Main configuration for a kvlink client core
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Optimistic Concurrency
    // -------------------------------------------------------------------------
    /// Maximum attempts of a read-modify-write loop before giving up
    pub cas_retry_limit: u32,

    /// Delay between conflicting attempts
    pub cas_retry_backoff: Backoff,

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------
    /// Timeout applied to every key-value request
    pub kv_timeout: Duration,

    // -------------------------------------------------------------------------
    // Cluster Layout
    // -------------------------------------------------------------------------
    /// Number of partitions (vbuckets) keys are hashed into
    pub num_partitions: u16,

    /// Bucket name reported in mutation tokens
    pub bucket: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cas_retry_limit: 10,
            cas_retry_backoff: Backoff::None,
            kv_timeout: Duration::from_millis(2500),
            num_partitions: 1024,
            bucket: "default".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default config with the retry ceiling taken from the environment, if set
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        if let Ok(raw) = std::env::var(CAS_RETRY_LIMIT_ENV) {
            config.cas_retry_limit = parse_retry_limit(&raw)?;
        }
        Ok(config)
    }
}

fn parse_retry_limit(raw: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(KvError::Config(format!(
            "{} must be at least 1",
            CAS_RETRY_LIMIT_ENV
        ))),
        Ok(limit) => Ok(limit),
        Err(e) => Err(KvError::Config(format!(
            "{} is not a valid attempt count ({:?}): {}",
            CAS_RETRY_LIMIT_ENV, raw, e
        ))),
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the optimistic retry ceiling
    pub fn cas_retry_limit(mut self, limit: u32) -> Self {
        self.config.cas_retry_limit = limit;
        self
    }

    /// Set the delay policy between conflicting attempts
    pub fn cas_retry_backoff(mut self, backoff: Backoff) -> Self {
        self.config.cas_retry_backoff = backoff;
        self
    }

    /// Set the per-request timeout
    pub fn kv_timeout(mut self, timeout: Duration) -> Self {
        self.config.kv_timeout = timeout;
        self
    }

    /// Set the number of partitions
    pub fn num_partitions(mut self, count: u16) -> Self {
        self.config.num_partitions = count;
        self
    }

    /// Set the bucket name
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
