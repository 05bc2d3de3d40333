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

//! Flamestore Storage Layer
//!
//! Persists profiling trees for many applications, indexed by application
//! name and labels.
//!
//! ## Architecture
//!
//! - **Caches**: four bounded moka caches (trees, dictionaries, segments,
//!   dimensions) in front of one redb database
//! - **Dimension index**: `label:value` to segment keys, used for deletion,
//!   application listing and label-filtered queries
//! - **Rollups**: every segment stores its samples at up to seven
//!   resolutions, from 10 second buckets to roughly 115 day buckets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flamestore_core::{Key, Tree};
//! use flamestore_storage::{PutInput, Storage, StorageConfig};
//! use prometheus::Registry;
//!
//! let registry = Registry::new();
//! let storage = Storage::new(StorageConfig::with_data_dir("/var/lib/flamestore"), &registry)?;
//!
//! let mut val = Tree::new();
//! val.insert(b"main;handle_request;parse", 12);
//! storage.put(&PutInput {
//!     start_time,
//!     end_time,
//!     key: Key::parse("api.cpu{env=prod}")?,
//!     val,
//!     spy_name: "ebpfspy".into(),
//!     sample_rate: 100,
//! })?;
//!
//! storage.delete_app("api.cpu")?;
//! storage.close()?;
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod metrics;
pub mod storage;

pub use backend::{KvBackend, RedbBackend};
pub use cache::Cache;
pub use config::{CacheConfig, StorageConfig, WritePolicy};
pub use dimensions::DimensionIndex;
pub use error::{BackendError, Result, StorageError};
pub use metrics::{CacheMetrics, StorageMetrics};
pub use storage::{
    GetInput, GetOutput, PutInput, Storage, DICT_PREFIX, DIMENSION_PREFIX, SEGMENT_PREFIX,
    TREE_PREFIX,
};
