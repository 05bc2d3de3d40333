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

//! Mergeable call-stack tree
//!
//! Stacks are `;`-separated frame lists (`main;work;parse`). Children are
//! kept sorted by frame name, so two trees holding the same samples compare
//! equal regardless of insertion or merge order.

use serde::{Deserialize, Serialize};

/// Aggregate of stack-trace samples for one time bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    root: Node,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Node {
    name: Vec<u8>,
    self_samples: u64,
    total: u64,
    children: Vec<Node>,
}

impl Node {
    fn named(name: &[u8]) -> Self {
        Self {
            name: name.to_vec(),
            ..Default::default()
        }
    }

    fn child_mut(&mut self, name: &[u8]) -> &mut Node {
        let idx = match self
            .children
            .binary_search_by(|c| c.name.as_slice().cmp(name))
        {
            Ok(idx) => idx,
            Err(idx) => {
                self.children.insert(idx, Node::named(name));
                idx
            }
        };
        &mut self.children[idx]
    }

    fn merge(&mut self, other: &Node) {
        self.self_samples = self.self_samples.saturating_add(other.self_samples);
        self.total = self.total.saturating_add(other.total);
        for child in &other.children {
            self.child_mut(&child.name).merge(child);
        }
    }

    /// Deal this node's self samples over `parts`. Each part gets the
    /// floor share, the remainder goes one sample at a time to the parts
    /// after `cursor`, which then advances so remainders rotate.
    fn spread(&self, prefix: &mut Vec<u8>, parts: &mut [Tree], cursor: &mut usize) {
        let n = parts.len();
        if self.self_samples > 0 {
            let base = self.self_samples / n as u64;
            let extra = (self.self_samples % n as u64) as usize;
            for (i, part) in parts.iter_mut().enumerate() {
                let bonus = (i + n - *cursor) % n < extra;
                part.insert(prefix, base + u64::from(bonus));
            }
            *cursor = (*cursor + extra) % n;
        }
        for child in &self.children {
            let len = prefix.len();
            if len > 0 {
                prefix.push(b';');
            }
            prefix.extend_from_slice(&child.name);
            child.spread(prefix, parts, cursor);
            prefix.truncate(len);
        }
    }

    fn collect_stacks(&self, prefix: &mut Vec<u8>, out: &mut Vec<(String, u64)>) {
        if self.self_samples > 0 {
            out.push((String::from_utf8_lossy(prefix).into_owned(), self.self_samples));
        }
        for child in &self.children {
            let len = prefix.len();
            if len > 0 {
                prefix.push(b';');
            }
            prefix.extend_from_slice(&child.name);
            child.collect_stacks(prefix, out);
            prefix.truncate(len);
        }
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `samples` to the stack `a;b;c`
    pub fn insert(&mut self, stack: &[u8], samples: u64) {
        if samples == 0 {
            return;
        }
        let mut node = &mut self.root;
        node.total = node.total.saturating_add(samples);
        for frame in stack.split(|b| *b == b';').filter(|f| !f.is_empty()) {
            node = node.child_mut(frame);
            node.total = node.total.saturating_add(samples);
        }
        node.self_samples = node.self_samples.saturating_add(samples);
    }

    /// Merge all samples of `other` into this tree
    pub fn merge(&mut self, other: &Tree) {
        self.root.merge(&other.root);
    }

    /// Split into `parts` trees whose merge equals this tree. Every stack
    /// is dealt out evenly; parts left without samples come back empty.
    pub fn split(&self, parts: usize) -> Vec<Tree> {
        if parts <= 1 {
            return vec![self.clone()];
        }
        let mut out = vec![Tree::new(); parts];
        self.root.spread(&mut Vec::new(), &mut out, &mut 0);
        out
    }

    /// Total number of samples
    pub fn samples(&self) -> u64 {
        self.root.total
    }

    pub fn is_empty(&self) -> bool {
        self.root.total == 0
    }

    /// Collapsed `stack -> self samples` pairs, sorted by stack
    pub fn stacks(&self) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        self.root.collect_stacks(&mut Vec::new(), &mut out);
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert() {
        let mut tree = Tree::new();
        tree.insert(b"a;b", 1);
        tree.insert(b"a;c", 2);
        tree.insert(b"a", 3);
        assert_eq!(tree.samples(), 6);
        assert_eq!(
            tree.stacks(),
            vec![("a".to_string(), 3), ("a;b".to_string(), 1), ("a;c".to_string(), 2)]
        );
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut left = Tree::new();
        left.insert(b"a;b", 1);
        let mut right = Tree::new();
        right.insert(b"x;y", 4);
        right.insert(b"a;b", 2);

        let mut lr = left.clone();
        lr.merge(&right);
        let mut rl = right.clone();
        rl.merge(&left);

        assert_eq!(lr, rl);
        assert_eq!(lr.samples(), 7);
        assert_eq!(lr.stacks()[0], ("a;b".to_string(), 3));
    }

    #[test]
    fn test_split_keeps_every_sample() {
        let mut tree = Tree::new();
        tree.insert(b"a;b", 10);
        tree.insert(b"a;c", 1);
        tree.insert(b"d", 2);

        let parts = tree.split(4);
        assert_eq!(parts.len(), 4);
        assert_eq!(
            parts.iter().map(Tree::samples).collect::<Vec<_>>(),
            vec![4, 3, 3, 3]
        );

        let mut merged = Tree::new();
        for part in &parts {
            merged.merge(part);
        }
        assert_eq!(merged, tree);
        assert_eq!(tree.split(1), vec![tree.clone()]);
    }

    #[test]
    fn test_split_sparse_tree() {
        let mut tree = Tree::new();
        tree.insert(b"main;work", 3);

        let parts = tree.split(100);
        assert_eq!(parts.iter().filter(|p| !p.is_empty()).count(), 3);
        assert_eq!(parts.iter().map(Tree::samples).sum::<u64>(), 3);
    }

    #[test]
    fn test_merge_saturates() {
        let mut tree = Tree::new();
        tree.insert(b"a", u64::MAX - 1);
        let mut more = Tree::new();
        more.insert(b"a", 5);

        tree.merge(&more);
        assert_eq!(tree.samples(), u64::MAX);
        assert_eq!(tree.stacks(), vec![("a".to_string(), u64::MAX)]);
    }

    #[test]
    fn test_zero_samples_ignored() {
        let mut tree = Tree::new();
        tree.insert(b"a;b", 0);
        assert!(tree.is_empty());
        assert_eq!(tree, Tree::new());
    }
}
