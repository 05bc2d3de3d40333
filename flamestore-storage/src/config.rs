// Copyright 2025 Flamestore (https://github.com/flamestore)
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

//! Storage configuration
//!
//! ```toml
//! data_dir = "/var/lib/flamestore"
//! write_policy = "write_back"
//!
//! [cache]
//! trees_capacity = 100000
//! dicts_capacity = 1000
//! segments_capacity = 10000
//! dimensions_capacity = 10000
//! ```

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the database file inside `data_dir`
pub const DB_FILE_NAME: &str = "flamestore.redb";

/// When cached values reach the durable backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Persist dirty entries on eviction or explicit dump
    #[default]
    WriteBack,
    /// Persist on every put
    WriteThrough,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the database file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub write_policy: WritePolicy,
}

/// Maximum resident entries per cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_trees_capacity")]
    pub trees_capacity: u64,

    #[serde(default = "default_dicts_capacity")]
    pub dicts_capacity: u64,

    #[serde(default = "default_segments_capacity")]
    pub segments_capacity: u64,

    #[serde(default = "default_dimensions_capacity")]
    pub dimensions_capacity: u64,
}

// Default values
fn default_data_dir() -> PathBuf {
    PathBuf::from("./flamestore-data")
}

fn default_trees_capacity() -> u64 {
    100_000
}

fn default_dicts_capacity() -> u64 {
    1_000
}

fn default_segments_capacity() -> u64 {
    10_000
}

fn default_dimensions_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            trees_capacity: default_trees_capacity(),
            dicts_capacity: default_dicts_capacity(),
            segments_capacity: default_segments_capacity(),
            dimensions_capacity: default_dimensions_capacity(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache: CacheConfig::default(),
            write_policy: WritePolicy::default(),
        }
    }
}

impl StorageConfig {
    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from an optional file, then apply `FLAMESTORE_DATA_DIR`
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
            None => Self::default(),
        };

        if let Ok(data_dir) = std::env::var("FLAMESTORE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("trees_capacity", self.cache.trees_capacity),
            ("dicts_capacity", self.cache.dicts_capacity),
            ("segments_capacity", self.cache.segments_capacity),
            ("dimensions_capacity", self.cache.dimensions_capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(StorageError::Config(format!("cache.{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// Path of the database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}
