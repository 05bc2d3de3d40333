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

//! Storage orchestrator
//!
//! Owns the four caches and keeps them consistent:
//!
//! - every segment key in `__name__:<app>` has a segment, and the reverse
//! - every label of a live segment has a dimension listing it; empty
//!   dimensions are deleted
//! - trees never outlive their segment
//! - an application's dictionary is removed together with the application
//!
//! Mutations (`put`, `delete_app`, `close`) are serialized by one write
//! lock. Reads take no orchestrator lock and may observe a mutation halfway.

mod delete;
mod get;
mod put;

pub use get::{GetInput, GetOutput};
pub use put::PutInput;

use crate::backend::{KvBackend, RedbBackend};
use crate::cache::Cache;
use crate::config::StorageConfig;
use crate::dimensions::DimensionIndex;
use crate::error::{Result, StorageError};
use crate::metrics::StorageMetrics;
use flamestore_core::{dimension_key, Dictionary, Dimension, Segment, Tree, APP_NAME_LABEL};
use parking_lot::RwLock;
use prometheus::Registry;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub const TREE_PREFIX: &str = "t:";
pub const DICT_PREFIX: &str = "d:";
pub const SEGMENT_PREFIX: &str = "s:";
pub const DIMENSION_PREFIX: &str = "i:";

pub struct Storage {
    config: StorageConfig,
    trees: Cache<Tree>,
    dicts: Cache<Dictionary>,
    segments: Cache<Segment>,
    dimensions: DimensionIndex,
    metrics: StorageMetrics,
    /// Serializes put / delete_app / close
    write_lock: RwLock<()>,
    shutdown: AtomicBool,
}

impl Storage {
    /// Open storage in `data_dir` with default settings
    pub fn open<P: AsRef<Path>>(data_dir: P, registry: &Registry) -> Result<Self> {
        Self::new(StorageConfig::with_data_dir(data_dir.as_ref()), registry)
    }

    /// Open the redb database described by `config`
    pub fn new(config: StorageConfig, registry: &Registry) -> Result<Self> {
        config.validate()?;
        info!("Opening flamestore storage at {:?}", config.data_dir);
        let backend = RedbBackend::open(config.db_path())?;
        Self::with_backend(config, Arc::new(backend), registry)
    }

    /// Build the caches over an already opened backend
    pub fn with_backend(
        config: StorageConfig,
        backend: Arc<dyn KvBackend>,
        registry: &Registry,
    ) -> Result<Self> {
        let metrics = StorageMetrics::new(registry)?;
        let policy = config.write_policy;
        let capacities = &config.cache;

        let trees = Cache::new(
            "trees",
            TREE_PREFIX,
            capacities.trees_capacity,
            policy,
            Arc::clone(&backend),
            metrics.cache("trees"),
        );
        let dicts = Cache::new(
            "dicts",
            DICT_PREFIX,
            capacities.dicts_capacity,
            policy,
            Arc::clone(&backend),
            metrics.cache("dicts"),
        );
        let segments = Cache::new(
            "segments",
            SEGMENT_PREFIX,
            capacities.segments_capacity,
            policy,
            Arc::clone(&backend),
            metrics.cache("segments"),
        );
        let dimensions = DimensionIndex::new(Cache::new(
            "dimensions",
            DIMENSION_PREFIX,
            capacities.dimensions_capacity,
            policy,
            backend,
            metrics.cache("dimensions"),
        ));

        info!(
            write_policy = ?policy,
            trees = capacities.trees_capacity,
            segments = capacities.segments_capacity,
            "Flamestore storage opened"
        );

        Ok(Self {
            config,
            trees,
            dicts,
            segments,
            dimensions,
            metrics,
            write_lock: RwLock::new(()),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn trees(&self) -> &Cache<Tree> {
        &self.trees
    }

    pub fn dicts(&self) -> &Cache<Dictionary> {
        &self.dicts
    }

    pub fn segments(&self) -> &Cache<Segment> {
        &self.segments
    }

    pub fn dimensions(&self) -> &DimensionIndex {
        &self.dimensions
    }

    pub fn metrics(&self) -> &StorageMetrics {
        &self.metrics
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(StorageError::Shutdown);
        }
        Ok(())
    }

    /// The `__name__:<app>` dimension, listing every segment of the app
    pub fn lookup_app_dimension(&self, app_name: &str) -> Result<Option<Dimension>> {
        self.dimensions
            .lookup(&dimension_key(APP_NAME_LABEL, app_name))
    }

    /// Names of all applications with at least one segment
    pub fn get_app_names(&self) -> Result<Vec<String>> {
        let prefix = dimension_key(APP_NAME_LABEL, "");
        Ok(self
            .dimensions
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Distinct label names, `__name__` included
    pub fn label_keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .dimensions
            .keys_with_prefix("")?
            .into_iter()
            .filter_map(|k| k.split_once(':').map(|(name, _)| name.to_string()))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Distinct values of one label
    pub fn label_values(&self, label: &str) -> Result<Vec<String>> {
        let prefix = dimension_key(label, "");
        Ok(self
            .dimensions
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    /// Flush every cache and refuse further mutations
    pub fn close(&self) -> Result<()> {
        let _write_guard = self.write_lock.write();
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!("Closing flamestore storage");
        let results = [
            self.trees.dump(),
            self.dicts.dump(),
            self.segments.dump(),
            self.dimensions.dump(),
        ];
        for result in results {
            result?;
        }
        info!("Flamestore storage closed");
        Ok(())
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.is_shutdown() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("Failed to flush storage on drop: {}", e);
        }
    }
}
