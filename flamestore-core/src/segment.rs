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

//! Segment metadata and time-bucket topology
//!
//! A segment is one (application, label set) time series. Besides the
//! ingestion parameters it owns the resolution rules that place samples into
//! tree buckets. Whether a bucket holds a tree is answered by the tree store;
//! the segment only remembers the *loose* depth-0 buckets, those holding data
//! while their depth-1 parent has no stored tree yet.
//!
//! ## Bucket Layout
//!
//! ```text
//! depth 2  [0 ....................................................... 1000)
//! depth 1  [0 ........ 100) [100 ...... 200) ... [900 ....... 1000)
//! depth 0  [0,10) [10,20) ... [90,100) [100,110) ...
//! ```
//!
//! Depth 0 is the finest resolution. Every coarser level is ten times wider
//! and a stored bucket at depth >= 1 always holds the merge of all samples in
//! its time span. A coarse bucket is stored once two depth-0 buckets below it
//! hold data, so the stored coarse buckets are closed upwards and an unstored
//! one has at most one depth-0 bucket with data below it, which is loose.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Width of a depth-0 bucket in seconds
pub const DEFAULT_RESOLUTION_SECS: i64 = 10;

/// Width ratio between two adjacent depths
pub const DEFAULT_MULTIPLIER: i64 = 10;

/// Coarsest depth of a new segment (10^7 seconds, roughly 115 days)
pub const DEFAULT_MAX_DEPTH: u32 = 6;

/// Bucket width for one resolution depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRule {
    pub depth: u32,
    pub width_secs: i64,
}

impl ResolutionRule {
    /// Start of the bucket containing `ts` (unix seconds)
    pub fn bucket_start(&self, ts: i64) -> i64 {
        ts - ts.rem_euclid(self.width_secs)
    }

    fn bucket_ceil(&self, ts: i64) -> i64 {
        let rem = ts.rem_euclid(self.width_secs);
        if rem == 0 {
            ts
        } else {
            ts - rem + self.width_secs
        }
    }
}

/// Resolution rules assigned to every newly created segment.
pub fn default_rules() -> Vec<ResolutionRule> {
    let mut width_secs = DEFAULT_RESOLUTION_SECS;
    (0..=DEFAULT_MAX_DEPTH)
        .map(|depth| {
            let rule = ResolutionRule { depth, width_secs };
            width_secs = width_secs.saturating_mul(DEFAULT_MULTIPLIER);
            rule
        })
        .collect()
}

/// Width of `depth` under the default rules, also for depths past the
/// coarsest stored level.
pub fn default_width(depth: u32) -> i64 {
    DEFAULT_MULTIPLIER
        .checked_pow(depth)
        .and_then(|m| m.checked_mul(DEFAULT_RESOLUTION_SECS))
        .unwrap_or(i64::MAX)
}

/// One tree bucket: resolution depth plus bucket start in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub depth: u32,
    pub start: i64,
}

impl Bucket {
    pub fn new(depth: u32, start: i64) -> Self {
        Self { depth, start }
    }
}

/// Per-segment ingestion parameters and loose-bucket bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    spy_name: String,
    sample_rate: u32,
    rules: Vec<ResolutionRule>,
    /// Starts of depth-0 buckets with data under an unstored depth-1 bucket
    loose: BTreeSet<i64>,
}

impl Default for Segment {
    fn default() -> Self {
        Self::new("", 0)
    }
}

impl Segment {
    /// Create a segment with the fixed rules for new segments
    pub fn new(spy_name: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            spy_name: spy_name.into(),
            sample_rate,
            rules: default_rules(),
            loose: BTreeSet::new(),
        }
    }

    pub fn spy_name(&self) -> &str {
        &self.spy_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Replace the ingestion parameters, returning true if they changed
    pub fn set_metadata(&mut self, spy_name: &str, sample_rate: u32) -> bool {
        if self.spy_name == spy_name && self.sample_rate == sample_rate {
            return false;
        }
        self.spy_name = spy_name.to_string();
        self.sample_rate = sample_rate;
        true
    }

    pub fn rules(&self) -> &[ResolutionRule] {
        &self.rules
    }

    pub fn rule(&self, depth: u32) -> Option<ResolutionRule> {
        self.rules.get(depth as usize).copied()
    }

    fn finest(&self) -> ResolutionRule {
        self.rules.first().copied().unwrap_or(ResolutionRule {
            depth: 0,
            width_secs: DEFAULT_RESOLUTION_SECS,
        })
    }

    fn coarsest(&self) -> ResolutionRule {
        self.rules.last().copied().unwrap_or_else(|| self.finest())
    }

    fn width(&self, depth: u32) -> i64 {
        self.rule(depth)
            .map(|r| r.width_secs)
            .unwrap_or_else(|| default_width(depth))
    }

    /// End of `bucket`'s time span (exclusive)
    pub fn end_of(&self, bucket: &Bucket) -> i64 {
        bucket.start.saturating_add(self.width(bucket.depth))
    }

    /// Loose depth-0 bucket starts, ascending
    pub fn loose(&self) -> impl Iterator<Item = i64> + '_ {
        self.loose.iter().copied()
    }

    /// Loose depth-0 bucket starts inside `[start, end)`
    pub fn loose_between(&self, start: i64, end: i64) -> impl Iterator<Item = i64> + '_ {
        let range = if end > start { start..end } else { start..start };
        self.loose.range(range).copied()
    }

    pub fn mark_loose(&mut self, start: i64) -> bool {
        self.loose.insert(start)
    }

    /// Forget a depth-0 bucket whose depth-1 parent now holds a tree
    pub fn settle(&mut self, start: i64) -> bool {
        self.loose.remove(&start)
    }

    /// Widen `[start, end)` to the depth-0 grid. An empty or inverted range
    /// becomes the single bucket containing `start`.
    pub fn normalize(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> (i64, i64) {
        let finest = self.finest();
        let st = finest.bucket_start(start.timestamp());
        let end_secs = end.timestamp() + i64::from(end.timestamp_subsec_nanos() > 0);
        let et = finest.bucket_ceil(end_secs);
        if et <= st {
            (st, st + finest.width_secs)
        } else {
            (st, et)
        }
    }

    /// Depth-0 buckets overlapped by `[start, end)`
    pub fn finest_buckets(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bucket> {
        let finest = self.finest();
        let (st, et) = self.normalize(start, end);
        (st..et)
            .step_by(finest.width_secs as usize)
            .map(|s| Bucket::new(0, s))
            .collect()
    }

    /// Enclosing bucket one level coarser, if the segment has that level
    pub fn parent(&self, bucket: &Bucket) -> Option<Bucket> {
        let rule = self.rule(bucket.depth + 1)?;
        Some(Bucket::new(rule.depth, rule.bucket_start(bucket.start)))
    }

    /// Buckets one level finer that tile `bucket`
    pub fn children(&self, bucket: &Bucket) -> Vec<Bucket> {
        if bucket.depth == 0 {
            return Vec::new();
        }
        let child_depth = bucket.depth - 1;
        let child_width = self.width(child_depth);
        let end = bucket.start.saturating_add(self.width(bucket.depth));
        (bucket.start..end)
            .step_by(child_width as usize)
            .map(|s| Bucket::new(child_depth, s))
            .collect()
    }

    /// Minimal set of stored buckets covering the data in `[start, end)`,
    /// preferring the coarsest bucket that lies fully inside the range.
    ///
    /// `is_stored` reports whether a bucket holds a tree. It is asked about
    /// the coarsest buckets overlapping the range and about the children of
    /// stored buckets the range cuts through, never about every bucket.
    pub fn query_plan<E>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mut is_stored: impl FnMut(&Bucket) -> Result<bool, E>,
    ) -> Result<Vec<Bucket>, E> {
        let (st, et) = self.normalize(start, end);
        let top = self.coarsest();

        let mut plan = Vec::new();
        let mut pending: Vec<Bucket> = (top.bucket_start(st)..et)
            .step_by(top.width_secs as usize)
            .map(|s| Bucket::new(top.depth, s))
            .collect();

        while let Some(bucket) = pending.pop() {
            let bucket_end = self.end_of(&bucket);
            let inside = bucket.start >= st && bucket_end <= et;

            if bucket.depth == 0 {
                if inside && is_stored(&bucket)? {
                    plan.push(bucket);
                }
                continue;
            }
            if !is_stored(&bucket)? {
                // Only a loose bucket can hold data below an unstored one
                plan.extend(
                    self.loose_between(bucket.start.max(st), bucket_end.min(et))
                        .map(|s| Bucket::new(0, s)),
                );
                continue;
            }
            if inside {
                plan.push(bucket);
                continue;
            }
            pending.extend(self.children(&bucket).into_iter().filter(|c| {
                c.start < et && self.end_of(c) > st
            }));
        }

        plan.sort();
        plan.dedup();
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), DEFAULT_MAX_DEPTH as usize + 1);
        assert_eq!(rules[0].width_secs, 10);
        assert_eq!(rules[1].width_secs, 100);
        assert_eq!(rules[6].width_secs, 10_000_000);
        assert_eq!(default_width(2), 1000);
    }

    #[test]
    fn test_normalize() {
        let segment = Segment::new("testspy", 100);
        assert_eq!(segment.normalize(at(10), at(19)), (10, 20));
        assert_eq!(segment.normalize(at(15), at(15)), (10, 20));
        assert_eq!(segment.normalize(at(20), at(10)), (20, 30));
        assert_eq!(segment.normalize(at(0), at(100)), (0, 100));
        assert_eq!(segment.normalize(at(-5), at(3)), (-10, 10));
    }

    #[test]
    fn test_finest_buckets() {
        let segment = Segment::new("testspy", 100);
        assert_eq!(segment.finest_buckets(at(10), at(19)), vec![Bucket::new(0, 10)]);
        assert_eq!(segment.finest_buckets(at(5), at(30)).len(), 3);
    }

    #[test]
    fn test_parent_and_children() {
        let segment = Segment::new("testspy", 100);
        let parent = segment.parent(&Bucket::new(0, 130)).unwrap();
        assert_eq!(parent, Bucket::new(1, 100));
        assert_eq!(segment.parent(&Bucket::new(6, 0)), None);

        let children = segment.children(&parent);
        assert_eq!(children.len(), 10);
        assert_eq!(children[0], Bucket::new(0, 100));
        assert_eq!(children[9], Bucket::new(0, 190));
        assert!(segment.children(&Bucket::new(0, 0)).is_empty());
    }

    fn plan(segment: &Segment, stored: &BTreeSet<Bucket>, start: i64, end: i64) -> Vec<Bucket> {
        segment
            .query_plan(at(start), at(end), |b| Ok::<_, ()>(stored.contains(b)))
            .unwrap()
    }

    #[test]
    fn test_loose_buckets() {
        let mut segment = Segment::new("testspy", 100);
        assert!(segment.mark_loose(10));
        assert!(!segment.mark_loose(10));
        segment.mark_loose(130);

        assert_eq!(segment.loose_between(0, 100).collect::<Vec<_>>(), vec![10]);
        assert_eq!(segment.loose_between(0, 1000).count(), 2);
        assert_eq!(segment.loose_between(100, 0).count(), 0);

        assert!(segment.settle(10));
        assert_eq!(segment.loose().collect::<Vec<_>>(), vec![130]);
    }

    #[test]
    fn test_query_plan_prefers_coarse_buckets() {
        let mut segment = Segment::new("testspy", 100);
        // 10 and 20 rolled up into depth 1 and above, 150 is loose
        let mut stored: BTreeSet<Bucket> =
            (1..=DEFAULT_MAX_DEPTH).map(|d| Bucket::new(d, 0)).collect();
        stored.insert(Bucket::new(0, 10));
        stored.insert(Bucket::new(0, 20));
        stored.insert(Bucket::new(0, 150));
        segment.mark_loose(150);

        assert_eq!(
            plan(&segment, &stored, 0, 200),
            vec![Bucket::new(0, 150), Bucket::new(1, 0)]
        );
        // Partial coverage of the depth-1 bucket falls back to depth 0
        assert_eq!(
            plan(&segment, &stored, 15, 40),
            vec![Bucket::new(0, 10), Bucket::new(0, 20)]
        );
        assert!(plan(&segment, &stored, 1000, 2000).is_empty());
    }

    #[test]
    fn test_query_plan_without_rollups() {
        let mut segment = Segment::new("testspy", 100);
        let mut stored = BTreeSet::new();
        stored.insert(Bucket::new(0, 50));
        segment.mark_loose(50);

        assert_eq!(plan(&segment, &stored, 0, 1000), vec![Bucket::new(0, 50)]);
        assert!(plan(&segment, &stored, 60, 1000).is_empty());
    }

    #[test]
    fn test_query_plan_propagates_lookup_errors() {
        let segment = Segment::new("testspy", 100);
        let result = segment.query_plan(at(0), at(100), |_| Err("backend down"));
        assert_eq!(result, Err("backend down"));
    }

    #[test]
    fn test_set_metadata() {
        let mut segment = Segment::new("gospy", 100);
        assert!(!segment.set_metadata("gospy", 100));
        assert!(segment.set_metadata("rbspy", 50));
        assert_eq!(segment.spy_name(), "rbspy");
        assert_eq!(segment.sample_rate(), 50);
    }
}
