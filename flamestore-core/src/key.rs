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

//! Application key parsing and canonical key encoding
//!
//! # Key Encoding
//!
//! ```text
//! input:        my.app.cpu{function=fast, foo=bar}
//! segment key:  my.app.cpu{foo=bar,function=fast}
//! tree key:     my.app.cpu{foo=bar,function=fast}:{depth}:{bucket_start_secs}
//! dimension:    __name__:my.app.cpu | foo:bar | function:fast
//! dictionary:   my.app.cpu
//! ```
//!
//! Labels are kept sorted by name, so two inputs that differ only in label
//! order produce the same segment key.

use crate::error::{FlamestoreError, Result};
use crate::segment::{default_width, Bucket, ResolutionRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Reserved label carrying the application name in the dimension index
pub const APP_NAME_LABEL: &str = "__name__";

/// Application name plus its label set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    app_name: String,
    labels: BTreeMap<String, String>,
}

impl Key {
    /// Create an unlabeled key
    pub fn new(app_name: &str) -> Result<Self> {
        let app_name = app_name.trim();
        validate_app_name(app_name).map_err(|reason| FlamestoreError::invalid_key(app_name, reason))?;
        Ok(Self {
            app_name: app_name.to_string(),
            labels: BTreeMap::new(),
        })
    }

    /// Parse `app` or `app{k=v,...}`
    pub fn parse(input: &str) -> Result<Self> {
        parse_key_inner(input.trim()).map_err(|reason| FlamestoreError::invalid_key(input, reason))
    }

    /// Add or replace one label
    pub fn with_label(mut self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = (name.trim(), value.trim());
        validate_label(name, value)
            .map_err(|reason| FlamestoreError::invalid_key(&format!("{}={}", name, value), reason))?;
        self.labels.insert(name.to_string(), value.to_string());
        Ok(self)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Canonical segment key, `app{}` when unlabeled
    pub fn segment_key(&self) -> String {
        let mut key = String::with_capacity(self.app_name.len() + 2 + self.labels.len() * 16);
        key.push_str(&self.app_name);
        key.push('{');
        for (i, (name, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(name);
            key.push('=');
            key.push_str(value);
        }
        key.push('}');
        key
    }

    /// Tree key for the bucket containing `t` at `depth`, under the
    /// resolution rules given to new segments.
    pub fn tree_key(&self, depth: u32, t: DateTime<Utc>) -> String {
        let rule = ResolutionRule {
            depth,
            width_secs: default_width(depth),
        };
        tree_key_for(&self.segment_key(), Bucket::new(depth, rule.bucket_start(t.timestamp())))
    }

    /// Dictionaries are shared by every label set of an application
    pub fn dict_key(&self) -> &str {
        &self.app_name
    }

    /// Dimension keys this segment is a member of, `__name__` first
    pub fn dimension_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.labels.len() + 1);
        keys.push(dimension_key(APP_NAME_LABEL, &self.app_name));
        keys.extend(self.labels.iter().map(|(name, value)| dimension_key(name, value)));
        keys
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segment_key())
    }
}

impl FromStr for Key {
    type Err = FlamestoreError;

    fn from_str(s: &str) -> Result<Self> {
        Key::parse(s)
    }
}

/// Parse an application key; see [`Key::parse`].
pub fn parse_key(input: &str) -> Result<Key> {
    Key::parse(input)
}

/// Tree key for one bucket of a segment
pub fn tree_key_for(segment_key: &str, bucket: Bucket) -> String {
    format!("{}:{}:{}", segment_key, bucket.depth, bucket.start)
}

/// Dimension key for one label
pub fn dimension_key(name: &str, value: &str) -> String {
    format!("{}:{}", name, value)
}

fn parse_key_inner(input: &str) -> std::result::Result<Key, &'static str> {
    let (name, label_block) = match input.find('{') {
        Some(idx) => (input[..idx].trim(), Some(&input[idx..])),
        None => (input, None),
    };
    validate_app_name(name)?;

    let mut key = Key {
        app_name: name.to_string(),
        labels: BTreeMap::new(),
    };

    let Some(block) = label_block else {
        return Ok(key);
    };

    // Leading '{' is guaranteed by find()
    let body = block[1..].strip_suffix('}').ok_or("unbalanced braces")?;
    if body.contains(['{', '}']) {
        return Err("nested braces");
    }

    for entry in body.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (label, value) = entry.split_once('=').ok_or("label without '='")?;
        let (label, value) = (label.trim(), value.trim());
        validate_label(label, value)?;
        key.labels.insert(label.to_string(), value.to_string());
    }

    Ok(key)
}

fn validate_app_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty application name");
    }
    for c in name.chars() {
        match c {
            '{' | '}' => return Err("unbalanced braces"),
            c if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | ':') => {}
            _ => return Err("invalid character in application name"),
        }
    }
    Ok(())
}

fn validate_label(name: &str, value: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty label name");
    }
    if name == APP_NAME_LABEL {
        return Err("reserved label name");
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return Err("invalid character in label name");
    }
    if value.is_empty() {
        return Err("empty label value");
    }
    if value.contains(['{', '}', ',']) {
        return Err("invalid character in label value");
    }
    Ok(())
}
