//! Merge engine configuration
//!
//! Loaded from a JSON file. Every field is optional; missing fields take the
//! defaults below. The config is validated once after loading and is
//! immutable afterwards.

mod errors;

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::merge::MAX_SHARD_NUM;
use crate::observability::Severity;

pub use errors::{ConfigError, ConfigResult};

/// Longest accepted transaction timeout (one day)
pub const MAX_TXN_TIMEOUT_MS: u64 = 86_400_000;

/// What to do when a shard stream reports an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Terminate the whole merge with a shard error
    #[default]
    FailFast,
    /// Drop the failed shard and merge the rest
    SkipFailed,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail_fast",
            FailurePolicy::SkipFailed => "skip_failed",
        }
    }
}

/// Merge engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum shard streams per merge (at most MAX_SHARD_NUM)
    #[serde(default = "default_max_shards")]
    pub max_shards: usize,

    /// Shard failure handling (default: fail_fast)
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Drop rows identical to the previously emitted row (default: true)
    #[serde(default = "default_suppress_duplicates")]
    pub suppress_duplicates: bool,

    /// Distributed transaction confirmation timeout in milliseconds
    #[serde(default = "default_txn_timeout_ms")]
    pub txn_timeout_ms: u64,

    /// Minimum log severity: trace, info, warn, error or fatal
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_shards() -> usize {
    MAX_SHARD_NUM
}
fn default_suppress_duplicates() -> bool {
    true
}
fn default_txn_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_shards: default_max_shards(),
            failure_policy: FailurePolicy::default(),
            suppress_duplicates: default_suppress_duplicates(),
            txn_timeout_ms: default_txn_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl MergeConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        let config: MergeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_shards == 0 || self.max_shards > MAX_SHARD_NUM {
            return Err(ConfigError::Invalid(format!(
                "max_shards must be between 1 and {}, got {}",
                MAX_SHARD_NUM, self.max_shards
            )));
        }
        if self.txn_timeout_ms == 0 || self.txn_timeout_ms > MAX_TXN_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "txn_timeout_ms must be between 1 and {}, got {}",
                MAX_TXN_TIMEOUT_MS, self.txn_timeout_ms
            )));
        }
        if self.severity().is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Transaction confirmation timeout
    pub fn txn_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.txn_timeout_ms.min(MAX_TXN_TIMEOUT_MS) as i64)
    }

    /// Parsed log level
    pub fn severity(&self) -> Option<Severity> {
        Severity::parse(&self.log_level)
    }
}
