//! Index build configuration
//!
//! TOML (or JSON) file; every field is optional.
//!
//! ```toml
//! threads = 8
//! resident_ply = 12
//! max_plies = 600
//! compress_snapshots = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Ingestion worker threads (0 = rayon default)
    #[serde(default)]
    pub threads: usize,
    /// Positions first reached at or below this ply stay in memory when the
    /// graph is fronted by a storage backend
    #[serde(default = "default_resident_ply")]
    pub resident_ply: u32,
    /// Skip samples kept in the ingestion report
    #[serde(default = "default_max_error_samples")]
    pub max_error_samples: usize,
    /// Longer games are skipped
    #[serde(default = "default_max_plies")]
    pub max_plies: usize,
    /// Log a progress line every N games (0 = off)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// gzip snapshots even without a `.gz` extension
    #[serde(default)]
    pub compress_snapshots: bool,
    /// Maintenance prune: minimum edge frequency (0 = off)
    #[serde(default)]
    pub prune_min_frequency: u64,
    /// Maintenance prune: minimum games through a trie node (0 = off)
    #[serde(default)]
    pub prune_min_descendants: u64,
}

fn default_resident_ply() -> u32 {
    12
}

fn default_max_error_samples() -> usize {
    100
}

fn default_max_plies() -> usize {
    1000
}

fn default_progress_interval() -> u64 {
    100_000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            resident_ply: default_resident_ply(),
            max_error_samples: default_max_error_samples(),
            max_plies: default_max_plies(),
            progress_interval: default_progress_interval(),
            compress_snapshots: false,
            prune_min_frequency: 0,
            prune_min_descendants: 0,
        }
    }
}

impl IndexConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: IndexConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `.toml` or `.json`; other extensions are read as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase());
        let config: IndexConfig = match ext.as_deref() {
            Some("json") => serde_json::from_str(&data).map_err(|e| ConfigError::Invalid {
                field: "<file>",
                reason: e.to_string(),
            })?,
            _ => toml::from_str(&data)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_plies == 0 {
            return Err(ConfigError::Invalid {
                field: "max_plies",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_plies > u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "max_plies",
                reason: format!("must fit in 32 bits, got {}", self.max_plies),
            });
        }
        Ok(())
    }
}
