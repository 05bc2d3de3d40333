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

//! Durable key-value backend
//!
//! All four caches share one redb table. Keys carry the cache prefix
//! (`t:`, `d:`, `s:`, `i:`), values are bincode-encoded.

use crate::error::BackendError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("flamestore");

/// Key-value store behind the caches
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), BackendError>;

    /// Write all entries in one transaction
    fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BackendError>;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// All stored keys starting with `prefix`, in key order
    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, BackendError>;
}

/// redb-backed [`KvBackend`]
pub struct RedbBackend {
    db: Database,
}

impl RedbBackend {
    /// Open or create the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path.as_ref()).map_err(redb::Error::from)?;
        Self::create_table(&db)?;
        Ok(Self { db })
    }

    fn create_table(db: &Database) -> Result<(), redb::Error> {
        let txn = db.begin_write()?;
        txn.open_table(ENTRIES)?;
        txn.commit()?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, redb::Error> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let value = table.get(key)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn write<'a, I>(&self, entries: I) -> Result<(), redb::Error>
    where
        I: IntoIterator<Item = (&'a str, &'a [u8])>,
    {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES)?;
            for (key, value) in entries {
                table.insert(key, value)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), redb::Error> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(ENTRIES)?;
            table.remove(key)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, redb::Error> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES)?;
        let mut keys = Vec::new();
        for entry in table.range(prefix..)? {
            let (key, _) = entry?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_string());
        }
        Ok(keys)
    }
}

impl KvBackend for RedbBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.read(key)?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        Ok(self.write([(key, value)])?)
    }

    fn put_batch(&self, entries: &[(String, Vec<u8>)]) -> Result<(), BackendError> {
        if entries.is_empty() {
            return Ok(());
        }
        Ok(self.write(entries.iter().map(|(k, v)| (k.as_str(), v.as_slice())))?)
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        Ok(self.remove(key)?)
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, BackendError> {
        Ok(self.keys(prefix)?)
    }
}
