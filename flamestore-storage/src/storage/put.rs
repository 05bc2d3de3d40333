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

//! Put: segment creation, dimension fan-out and tree rollups
//!
//! ## Rollups
//!
//! The input is dealt out over the depth-0 buckets its range overlaps. Each
//! depth-0 write then walks up the bucket hierarchy:
//!
//! ```text
//! ancestor stored?                 -> merge the same increment into it
//! an ancestor below it was stored  -> store it as a copy of that rollup
//! another loose bucket inside it   -> store it as the merge of both
//! otherwise                        -> leave it absent, keep walking
//! ```
//!
//! A stored bucket therefore always holds every sample in its span, and a
//! single put into an empty segment stores exactly one tree.

use super::Storage;
use crate::error::Result;
use chrono::{DateTime, Utc};
use flamestore_core::{tree_key_for, Bucket, Key, Segment, Tree};
use tracing::debug;

/// One batch of samples for one series
#[derive(Debug, Clone)]
pub struct PutInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub key: Key,
    pub val: Tree,
    pub spy_name: String,
    pub sample_rate: u32,
}

impl Storage {
    /// Store `input.val` for `[start_time, end_time)`.
    ///
    /// Returns the first error encountered. Writes made before the error are
    /// kept. Segment creation and dimension membership are idempotent, but
    /// tree merges add: retrying a put that failed after some tree writes
    /// counts those buckets twice.
    pub fn put(&self, input: &PutInput) -> Result<()> {
        let _write_guard = self.write_lock.write();
        // Checked under the lock so a put cannot land after close dumped
        self.ensure_open()?;
        let timer = self.metrics.put_duration.start_timer();

        self.metrics.puts.inc();
        let result = self.put_locked(input);
        if result.is_err() {
            self.metrics.put_errors.inc();
        }
        timer.observe_duration();
        result
    }

    fn put_locked(&self, input: &PutInput) -> Result<()> {
        let segment_key = input.key.segment_key();

        let mut segment = match self.segments.lookup(&segment_key)? {
            Some(mut segment) => {
                if segment.set_metadata(&input.spy_name, input.sample_rate) {
                    debug!(
                        segment = %segment_key,
                        spy = %input.spy_name,
                        sample_rate = input.sample_rate,
                        "Updated segment metadata"
                    );
                }
                segment
            }
            None => {
                debug!(segment = %segment_key, spy = %input.spy_name, "Creating segment");
                let segment = Segment::new(input.spy_name.clone(), input.sample_rate);
                self.segments.put(&segment_key, segment.clone())?;
                segment
            }
        };

        for dimension_key in input.key.dimension_keys() {
            self.dimensions.add_member(&dimension_key, &segment_key)?;
        }

        let written = self.write_trees(&segment_key, &mut segment, input);
        // Record loose buckets that reached the tree cache, also on failure
        let stored = self.segments.put(&segment_key, segment);
        written.and(stored)
    }

    fn write_trees(&self, segment_key: &str, segment: &mut Segment, input: &PutInput) -> Result<()> {
        let buckets = segment.finest_buckets(input.start_time, input.end_time);
        let shares = input.val.split(buckets.len());

        for (bucket, share) in buckets.into_iter().zip(shares) {
            if share.is_empty() {
                continue;
            }
            self.write_bucket(segment_key, segment, bucket, &share)?;
        }
        Ok(())
    }

    fn write_bucket(
        &self,
        segment_key: &str,
        segment: &mut Segment,
        bucket: Bucket,
        increment: &Tree,
    ) -> Result<()> {
        let finest = self.merge_tree(segment_key, bucket, increment)?;

        // Rollup stored below the current ancestor during this walk
        let mut rollup: Option<Tree> = None;
        let mut settled = segment.parent(&bucket).is_none();
        let mut current = bucket;

        while let Some(parent) = segment.parent(&current) {
            let parent_key = tree_key_for(segment_key, parent);
            if self.trees.contains(&parent_key)? {
                self.merge_tree(segment_key, parent, increment)?;
            } else if let Some(tree) = &rollup {
                self.trees.put(&parent_key, tree.clone())?;
            } else {
                let other = segment
                    .loose_between(parent.start, segment.end_of(&parent))
                    .find(|start| *start != bucket.start);
                if let Some(other) = other {
                    let tree = self.materialize(segment_key, parent, &finest, other)?;
                    if parent.depth == 1 {
                        segment.settle(other);
                    }
                    rollup = Some(tree);
                }
            }

            if parent.depth == 1 {
                settled = rollup.is_some() || self.trees.contains(&parent_key)?;
            }
            current = parent;
        }

        if settled {
            segment.settle(bucket.start);
        } else {
            segment.mark_loose(bucket.start);
        }
        Ok(())
    }

    /// Merge `increment` into the tree at `bucket`, returning the result
    fn merge_tree(&self, segment_key: &str, bucket: Bucket, increment: &Tree) -> Result<Tree> {
        let tree_key = tree_key_for(segment_key, bucket);
        let tree = match self.trees.lookup(&tree_key)? {
            Some(mut existing) => {
                existing.merge(increment);
                existing
            }
            None => increment.clone(),
        };
        self.trees.put(&tree_key, tree.clone())?;
        Ok(tree)
    }

    /// Store `bucket` as the merge of its only two depth-0 buckets with data
    fn materialize(
        &self,
        segment_key: &str,
        bucket: Bucket,
        finest: &Tree,
        other: i64,
    ) -> Result<Tree> {
        let mut tree = finest.clone();
        if let Some(loose) = self.trees.lookup(&tree_key_for(segment_key, Bucket::new(0, other)))? {
            tree.merge(&loose);
        }

        self.trees.put(&tree_key_for(segment_key, bucket), tree.clone())?;
        debug!(
            segment = %segment_key,
            depth = bucket.depth,
            start = bucket.start,
            "Materialized rollup bucket"
        );
        Ok(tree)
    }
}
