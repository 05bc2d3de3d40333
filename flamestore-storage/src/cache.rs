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

//! Bounded cache with durable backing
//!
//! Each cache keeps at most `capacity` values resident in a moka cache and
//! stores everything else in the shared [`KvBackend`] under its own key
//! prefix:
//!
//! | Cache      | Prefix | Value        |
//! |------------|--------|--------------|
//! | trees      | `t:`   | `Tree`       |
//! | dicts      | `d:`   | `Dictionary` |
//! | segments   | `s:`   | `Segment`    |
//! | dimensions | `i:`   | `Dimension`  |
//!
//! Under [`WritePolicy::WriteBack`] a `put` only touches memory; the value is
//! persisted when moka evicts it or on [`Cache::dump`]. Under
//! [`WritePolicy::WriteThrough`] every `put` is persisted before it returns.
//!
//! A deleted key is tombstoned until the next [`Cache::dump`], so an eviction
//! racing the delete cannot write the old value back.

use crate::backend::KvBackend;
use crate::config::WritePolicy;
use crate::error::{Result, StorageError};
use crate::metrics::CacheMetrics;
use moka::notification::RemovalCause;
use moka::sync::Cache as MokaCache;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error};

/// Resident value plus whether it still has to reach the backend
#[derive(Clone)]
struct Slot<V> {
    value: Arc<V>,
    dirty: bool,
}

pub struct Cache<V> {
    name: &'static str,
    prefix: &'static str,
    entries: MokaCache<String, Slot<V>>,
    backend: Arc<dyn KvBackend>,
    policy: WritePolicy,
    metrics: CacheMetrics,
    /// Serializes backend fills with writes to the same cache, so a miss
    /// never reinstalls a value older than a concurrent put.
    fill_lock: Mutex<()>,
    /// Keys deleted since the last dump. Shared with the eviction listener.
    tombstones: Arc<Mutex<HashSet<String>>>,
}

impl<V> Cache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        prefix: &'static str,
        capacity: u64,
        policy: WritePolicy,
        backend: Arc<dyn KvBackend>,
        metrics: CacheMetrics,
    ) -> Self {
        let listener_backend = Arc::clone(&backend);
        let evictions = metrics.evictions.clone();
        let tombstones = Arc::new(Mutex::new(HashSet::new()));
        let listener_tombstones = Arc::clone(&tombstones);

        let entries = MokaCache::builder()
            .name(name)
            .max_capacity(capacity)
            .eviction_listener(move |key: Arc<String>, slot: Slot<V>, cause: RemovalCause| {
                if !cause.was_evicted() {
                    return;
                }
                evictions.inc();
                if !slot.dirty {
                    return;
                }
                if let Err(e) = persist_evicted(
                    listener_backend.as_ref(),
                    &listener_tombstones,
                    prefix,
                    &key,
                    slot.value.as_ref(),
                ) {
                    error!(cache = name, key = %key, error = %e, "Failed to persist evicted entry");
                }
            })
            .build();

        Self {
            name,
            prefix,
            entries,
            backend,
            policy,
            metrics,
            fill_lock: Mutex::new(()),
            tombstones,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Insert or replace `key`
    pub fn put(&self, key: &str, value: V) -> Result<()> {
        let _guard = self.fill_lock.lock();
        self.tombstones.lock().remove(key);
        let dirty = match self.policy {
            WritePolicy::WriteBack => true,
            WritePolicy::WriteThrough => {
                persist(self.backend.as_ref(), &self.storage_key(key), &value)?;
                false
            }
        };
        self.entries.insert(
            key.to_string(),
            Slot {
                value: Arc::new(value),
                dirty,
            },
        );
        Ok(())
    }

    /// Whether `key` is resident or persisted. A persisted value is neither
    /// decoded nor loaded into the cache.
    pub fn contains(&self, key: &str) -> Result<bool> {
        if self.entries.contains_key(key) {
            return Ok(true);
        }
        let storage_key = self.storage_key(key);
        self.backend
            .get(&storage_key)
            .map(|bytes| bytes.is_some())
            .map_err(|source| StorageError::CacheReadFailure {
                key: storage_key,
                source,
            })
    }

    /// Resident value, or the persisted one loaded into the cache
    pub fn lookup(&self, key: &str) -> Result<Option<V>> {
        if let Some(slot) = self.entries.get(key) {
            self.metrics.hits.inc();
            return Ok(Some(slot.value.as_ref().clone()));
        }

        let _guard = self.fill_lock.lock();
        // A put may have landed while we waited
        if let Some(slot) = self.entries.get(key) {
            self.metrics.hits.inc();
            return Ok(Some(slot.value.as_ref().clone()));
        }
        self.metrics.misses.inc();

        let storage_key = self.storage_key(key);
        let Some(bytes) = self
            .backend
            .get(&storage_key)
            .map_err(|source| StorageError::CacheReadFailure {
                key: storage_key.clone(),
                source,
            })?
        else {
            return Ok(None);
        };

        let value: V = bincode::deserialize(&bytes).map_err(|source| StorageError::Codec {
            key: storage_key,
            source,
        })?;
        self.entries.insert(
            key.to_string(),
            Slot {
                value: Arc::new(value.clone()),
                dirty: false,
            },
        );
        Ok(Some(value))
    }

    /// Remove `key` from memory and from the backend
    pub fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.fill_lock.lock();
        // Released before invalidate, which may run the eviction listener
        self.tombstones.lock().insert(key.to_string());
        self.entries.invalidate(key);
        let storage_key = self.storage_key(key);
        self.backend
            .delete(&storage_key)
            .map_err(|source| StorageError::CacheDeleteFailure {
                key: storage_key,
                source,
            })
    }

    /// Number of resident entries
    pub fn size(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    /// Persist every dirty resident entry in one backend batch
    pub fn dump(&self) -> Result<()> {
        self.entries.run_pending_tasks();
        self.tombstones.lock().clear();

        let dirty: Vec<(Arc<String>, Slot<V>)> =
            self.entries.iter().filter(|(_, slot)| slot.dirty).collect();
        if dirty.is_empty() {
            return Ok(());
        }

        let mut batch = Vec::with_capacity(dirty.len());
        for (key, slot) in &dirty {
            let storage_key = self.storage_key(key);
            let bytes = encode(&storage_key, slot.value.as_ref())?;
            batch.push((storage_key, bytes));
        }
        self.backend
            .put_batch(&batch)
            .map_err(|source| StorageError::CacheWriteFailure {
                key: format!("{}*", self.prefix),
                source,
            })?;

        // Only entries untouched since the snapshot become clean
        let _guard = self.fill_lock.lock();
        for (key, slot) in dirty {
            if let Some(current) = self.entries.get(key.as_str()) {
                if current.dirty && Arc::ptr_eq(&current.value, &slot.value) {
                    self.entries.insert(
                        key.as_str().to_string(),
                        Slot {
                            value: current.value,
                            dirty: false,
                        },
                    );
                }
            }
        }

        debug!(cache = self.name, entries = batch.len(), "Dumped dirty entries");
        Ok(())
    }

    /// Keys starting with `prefix`, persisted or dirty, sorted and without
    /// the cache prefix.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let scan = self.storage_key(prefix);
        let mut keys: Vec<String> = self
            .backend
            .scan_keys(&scan)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(self.prefix).map(str::to_string))
            .collect();

        keys.extend(
            self.entries
                .iter()
                .filter(|(key, slot)| slot.dirty && key.starts_with(prefix))
                .map(|(key, _)| key.as_str().to_string()),
        );

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

fn encode<V: Serialize>(storage_key: &str, value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|source| StorageError::Codec {
        key: storage_key.to_string(),
        source,
    })
}

/// Write an evicted dirty value unless its key was deleted meanwhile. The
/// tombstone lock is held across the write, so a racing delete either lands
/// after it or is seen here.
fn persist_evicted<V: Serialize>(
    backend: &dyn KvBackend,
    tombstones: &Mutex<HashSet<String>>,
    prefix: &str,
    key: &str,
    value: &V,
) -> Result<()> {
    let tombstones = tombstones.lock();
    if tombstones.contains(key) {
        debug!(key = key, "Skipping eviction of deleted entry");
        return Ok(());
    }
    persist(backend, &format!("{}{}", prefix, key), value)
}

fn persist<V: Serialize>(backend: &dyn KvBackend, storage_key: &str, value: &V) -> Result<()> {
    let bytes = encode(storage_key, value)?;
    backend
        .put(storage_key, &bytes)
        .map_err(|source| StorageError::CacheWriteFailure {
            key: storage_key.to_string(),
            source,
        })
}
