//! TOML configuration for the coordinator.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.
//!
//! ```toml
//! [coordinator]
//! max_concurrency = 16
//! operation_timeout_ms = 30000
//! default_ttl = 2
//!
//! [split]
//! payload_chunk_size = 65536
//! max_split_chain_depth = 4096
//! max_object_size = 67108864
//!
//! [tombstone]
//! lifetime_epochs = 5
//!
//! [placement]
//! vnodes_per_node = 128
//! backup_factor = 1
//!
//! [log]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Fan-out and deadlines.
    pub coordinator: CoordinatorSection,
    /// Chunking and split-chain limits.
    pub split: SplitSection,
    /// Tombstone parameters.
    pub tombstone: TombstoneSection,
    /// Ring and candidate selection.
    pub placement: PlacementSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[coordinator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// Maximum concurrent node calls per operation.
    pub max_concurrency: usize,
    /// Deadline of one operation in milliseconds.
    pub operation_timeout_ms: u64,
    /// TTL given to requests built without explicit parameters.
    pub default_ttl: u32,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            operation_timeout_ms: 30_000,
            default_ttl: kelp_types::DEFAULT_TTL,
        }
    }
}

/// `[split]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSection {
    /// Size of one put-stream chunk message.
    pub payload_chunk_size: usize,
    /// Longest previous-link chain followed before giving up.
    pub max_split_chain_depth: usize,
    /// Payloads larger than this are stored as a split chain.
    pub max_object_size: usize,
}

impl Default for SplitSection {
    fn default() -> Self {
        Self {
            payload_chunk_size: 64 * 1024,
            max_split_chain_depth: 4096,
            max_object_size: 64 * 1024 * 1024,
        }
    }
}

/// `[tombstone]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TombstoneSection {
    /// Epochs a tombstone lives past the epoch it was created in.
    pub lifetime_epochs: u64,
}

impl Default for TombstoneSection {
    fn default() -> Self {
        Self { lifetime_epochs: 5 }
    }
}

/// `[placement]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSection {
    /// Vnodes per node on the ring.
    pub vnodes_per_node: u16,
    /// Lower bound on every container's backup factor.
    pub backup_factor: u32,
}

impl Default for PlacementSection {
    fn default() -> Self {
        Self {
            vnodes_per_node: 128,
            backup_factor: 1,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Load and validate config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: CoordinatorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coordinator.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be positive".into()));
        }
        if self.coordinator.default_ttl == 0 {
            return Err(ConfigError::Invalid("default_ttl must be positive".into()));
        }
        if self.split.payload_chunk_size == 0 {
            return Err(ConfigError::Invalid("payload_chunk_size must be positive".into()));
        }
        if self.split.max_object_size == 0 {
            return Err(ConfigError::Invalid("max_object_size must be positive".into()));
        }
        if self.split.max_split_chain_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_split_chain_depth must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Deadline of one operation.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.coordinator.operation_timeout_ms)
    }
}
