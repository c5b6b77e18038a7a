// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the history engine
//!
//! Every section has production defaults and can be overridden from TOML.
//! Missing sections and fields fall back to their defaults:
//!
//! ```toml
//! [snapshot]
//! interval = 20
//!
//! [rollback]
//! transaction_timeout_ms = 10000
//! ```

use crate::version::ChangeType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default number of versions between forced snapshots
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 10;

/// Snapshots whose serialized size exceeds this are gzip-compressed (50 KB)
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 50 * 1024;

/// Default ceiling on parent hops during reconstruction
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10_000;

/// Default time-to-live of a cached comparison (24 hours)
pub const DEFAULT_COMPARISON_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted comparison TTL (ten years)
pub const MAX_COMPARISON_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// When to store a full snapshot instead of a delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Every `interval`-th version number is a snapshot
    pub interval: u64,
    pub compression_threshold_bytes: usize,
    /// Change types that always produce a snapshot
    pub snapshot_change_types: Vec<ChangeType>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SNAPSHOT_INTERVAL,
            compression_threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD,
            snapshot_change_types: vec![ChangeType::Major, ChangeType::Template],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub max_chain_depth: usize,
    /// Wall-clock budget for one reconstruction. None = unbounded
    pub timeout_ms: Option<u64>,
    /// Reconstructed states kept in memory. 0 disables the cache
    pub state_cache_capacity: u64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            timeout_ms: None,
            state_cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// An auto-save is skipped when the elements hash is unchanged and the
    /// element count moved by at most this much
    pub element_count_threshold: usize,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            element_count_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    pub transaction_timeout_ms: u64,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_COMPARISON_TTL_SECS,
            cache_capacity: 10_000,
        }
    }
}

/// Pagination bounds for history listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryListConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for HistoryListConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub snapshot: SnapshotConfig,
    pub reconstruction: ReconstructionConfig,
    pub autosave: AutosaveConfig,
    pub rollback: RollbackConfig,
    pub comparison: ComparisonConfig,
    pub history: HistoryListConfig,
}

impl HistoryConfig {
    /// Production defaults
    pub fn production() -> Self {
        Self::default()
    }

    /// Small caches and short timeouts, for tests and embedding
    pub fn testing() -> Self {
        Self {
            reconstruction: ReconstructionConfig {
                max_chain_depth: 1_000,
                timeout_ms: Some(5_000),
                state_cache_capacity: 64,
            },
            rollback: RollbackConfig {
                transaction_timeout_ms: 5_000,
            },
            comparison: ComparisonConfig {
                ttl_secs: 60,
                cache_capacity: 128,
            },
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot.interval == 0 {
            return Err(ConfigError::Invalid("snapshot.interval must be at least 1".into()));
        }
        if self.reconstruction.max_chain_depth == 0 {
            return Err(ConfigError::Invalid(
                "reconstruction.max_chain_depth must be at least 1".into(),
            ));
        }
        if self.rollback.transaction_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rollback.transaction_timeout_ms must be positive".into(),
            ));
        }
        if self.comparison.ttl_secs == 0 || self.comparison.ttl_secs > MAX_COMPARISON_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "comparison.ttl_secs must be within 1..={MAX_COMPARISON_TTL_SECS}"
            )));
        }
        if self.history.default_limit == 0 || self.history.default_limit > self.history.max_limit {
            return Err(ConfigError::Invalid(format!(
                "history.default_limit ({}) must be within 1..={}",
                self.history.default_limit, self.history.max_limit
            )));
        }
        Ok(())
    }
}
