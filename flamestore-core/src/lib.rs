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

//! Flamestore Core
//!
//! Data model for the profile storage engine: application keys, call-stack
//! trees, symbol dictionaries, label dimensions and segment metadata.

pub mod dict;
pub mod dimension;
pub mod error;
pub mod key;
pub mod segment;
pub mod tree;

pub use dict::Dictionary;
pub use dimension::{intersection, Dimension};
pub use error::{FlamestoreError, Result};
pub use key::{dimension_key, parse_key, tree_key_for, Key, APP_NAME_LABEL};
pub use segment::{
    default_rules, default_width, Bucket, ResolutionRule, Segment, DEFAULT_MAX_DEPTH,
    DEFAULT_MULTIPLIER, DEFAULT_RESOLUTION_SECS,
};
pub use tree::Tree;
