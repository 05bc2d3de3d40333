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

use flamestore_core::FlamestoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Failure of the durable key-value backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the storage orchestrator and its caches
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    InvalidKey(#[from] FlamestoreError),

    #[error("Cache write failed for {key}: {source}")]
    CacheWriteFailure { key: String, source: BackendError },

    #[error("Cache delete failed for {key}: {source}")]
    CacheDeleteFailure { key: String, source: BackendError },

    #[error("Cache read failed for {key}: {source}")]
    CacheReadFailure { key: String, source: BackendError },

    #[error("Codec error for {key}: {source}")]
    Codec { key: String, source: bincode::Error },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage is shut down")]
    Shutdown,
}
