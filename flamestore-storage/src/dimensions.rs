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

//! Label inverted index
//!
//! Maps `label:value` (including `__name__:<app>`) to the segment keys that
//! carry it. A dimension whose last member is removed is deleted outright,
//! so an existing dimension is never empty.

use crate::cache::Cache;
use crate::error::Result;
use flamestore_core::Dimension;
use std::ops::Deref;
use tracing::debug;

pub struct DimensionIndex {
    cache: Cache<Dimension>,
}

impl DimensionIndex {
    pub fn new(cache: Cache<Dimension>) -> Self {
        Self { cache }
    }

    /// Add `segment_key` to `dimension_key`, creating the dimension on
    /// first use. Returns false if it was already a member.
    pub fn add_member(&self, dimension_key: &str, segment_key: &str) -> Result<bool> {
        let mut dimension = self.cache.lookup(dimension_key)?.unwrap_or_default();
        if !dimension.insert(segment_key) {
            return Ok(false);
        }
        self.cache.put(dimension_key, dimension)?;
        Ok(true)
    }

    /// Remove `segment_key` from `dimension_key`, deleting the dimension
    /// once it has no members. Returns false if it was not a member.
    pub fn remove_member(&self, dimension_key: &str, segment_key: &str) -> Result<bool> {
        let Some(mut dimension) = self.cache.lookup(dimension_key)? else {
            return Ok(false);
        };
        if !dimension.remove(segment_key) {
            return Ok(false);
        }

        if dimension.is_empty() {
            debug!(dimension = dimension_key, "Pruning empty dimension");
            self.cache.delete(dimension_key)?;
        } else {
            self.cache.put(dimension_key, dimension)?;
        }
        Ok(true)
    }
}

impl Deref for DimensionIndex {
    type Target = Cache<Dimension>;

    fn deref(&self) -> &Self::Target {
        &self.cache
    }
}
