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

use super::Storage;
use crate::error::Result;
use flamestore_core::Key;
use tracing::{debug, info};

impl Storage {
    /// Delete an application with all its segments, trees, dimension
    /// memberships and its dictionary.
    ///
    /// **Cascading Deletes:** for each segment listed in `__name__:<app>`:
    /// - every tree whose key starts with the segment key, found by a
    ///   prefix scan so trees of an earlier failed put go too
    /// - the segment itself
    /// - the segment's membership in each of its dimensions (empty
    ///   dimensions are deleted)
    ///
    /// The dictionary `d:<app>` is deleted last. Deleting an unknown
    /// application succeeds and removes nothing but a stray dictionary.
    pub fn delete_app(&self, app_name: &str) -> Result<()> {
        let _write_guard = self.write_lock.write();
        self.ensure_open()?;
        self.metrics.app_deletes.inc();

        match self.lookup_app_dimension(app_name)? {
            None => debug!(app = app_name, "Application not found, nothing to delete"),
            Some(dimension) => {
                let segment_keys: Vec<String> = dimension.keys().map(str::to_string).collect();
                for segment_key in &segment_keys {
                    self.delete_segment(segment_key)?;
                }
                info!(app = app_name, segments = segment_keys.len(), "Deleted application");
            }
        }

        self.dicts.delete(app_name)
    }

    /// Trees go first and dimensions last, so an interrupted delete leaves
    /// the segment reachable for a retry.
    fn delete_segment(&self, segment_key: &str) -> Result<()> {
        let key = Key::parse(segment_key)?;

        let tree_keys = self.trees.keys_with_prefix(&format!("{}:", segment_key))?;
        for tree_key in &tree_keys {
            self.trees.delete(tree_key)?;
        }
        self.segments.delete(segment_key)?;

        for dimension_key in key.dimension_keys() {
            self.dimensions.remove_member(&dimension_key, segment_key)?;
        }
        debug!(segment = segment_key, trees = tree_keys.len(), "Deleted segment");
        Ok(())
    }
}
