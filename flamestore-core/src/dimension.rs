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

//! Inverted-index entry: the segment keys carrying one label

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of segment keys for one `label:value` pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    keys: BTreeSet<String>,
}

impl Dimension {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a segment key, returning false if it was already a member
    pub fn insert(&mut self, segment_key: &str) -> bool {
        if self.keys.contains(segment_key) {
            return false;
        }
        self.keys.insert(segment_key.to_string())
    }

    /// Remove a segment key, returning false if it was not a member
    pub fn remove(&mut self, segment_key: &str) -> bool {
        self.keys.remove(segment_key)
    }

    pub fn contains(&self, segment_key: &str) -> bool {
        self.keys.contains(segment_key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Segment keys present in every dimension. Empty input yields no keys.
pub fn intersection(dimensions: &[Dimension]) -> Vec<String> {
    let Some(smallest) = dimensions.iter().min_by_key(|d| d.len()) else {
        return Vec::new();
    };
    smallest
        .keys()
        .filter(|k| dimensions.iter().all(|d| d.contains(k)))
        .map(str::to_string)
        .collect()
}
