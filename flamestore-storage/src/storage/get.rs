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

//! Range queries

use super::Storage;
use crate::error::Result;
use chrono::{DateTime, Utc};
use flamestore_core::{intersection, tree_key_for, Bucket, Key, Segment, Tree};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GetInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Matches every segment of the app carrying at least these labels
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutput {
    pub tree: Tree,
    pub spy_name: String,
    pub sample_rate: u32,
}

impl Storage {
    /// Merge all samples of the matching segments within
    /// `[start_time, end_time)`, widened to the depth-0 grid.
    ///
    /// Returns `None` when no segment matches the key.
    pub fn get(&self, input: &GetInput) -> Result<Option<GetOutput>> {
        self.metrics.gets.inc();

        let mut dimensions = Vec::new();
        for dimension_key in input.key.dimension_keys() {
            match self.dimensions.lookup(&dimension_key)? {
                Some(dimension) => dimensions.push(dimension),
                None => return Ok(None),
            }
        }

        let mut tree = Tree::new();
        let mut metadata = None;
        for segment_key in intersection(&dimensions) {
            let Some(segment) = self.segments.lookup(&segment_key)? else {
                continue;
            };

            let plan = self.plan(&segment_key, &segment, input.start_time, input.end_time)?;
            debug!(segment = %segment_key, buckets = plan.len(), "Planned range query");
            for bucket in plan {
                if let Some(stored) = self.trees.lookup(&tree_key_for(&segment_key, bucket))? {
                    tree.merge(&stored);
                }
            }

            if metadata.is_none() {
                metadata = Some((segment.spy_name().to_string(), segment.sample_rate()));
            }
        }

        Ok(metadata.map(|(spy_name, sample_rate)| GetOutput {
            tree,
            spy_name,
            sample_rate,
        }))
    }

    /// Stored buckets of one segment that together cover `[start, end)`
    pub fn query_plan(
        &self,
        segment_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        match self.segments.lookup(segment_key)? {
            Some(segment) => self.plan(segment_key, &segment, start, end),
            None => Ok(Vec::new()),
        }
    }

    fn plan(
        &self,
        segment_key: &str,
        segment: &Segment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bucket>> {
        segment.query_plan(start, end, |bucket| {
            self.trees.contains(&tree_key_for(segment_key, *bucket))
        })
    }
}
