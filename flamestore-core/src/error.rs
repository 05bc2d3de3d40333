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

//! Core error types

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, FlamestoreError>;

/// Errors produced by the core data model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlamestoreError {
    /// Malformed application name or label set
    #[error("Invalid key {input:?}: {reason}")]
    InvalidKey { input: String, reason: &'static str },
}

impl FlamestoreError {
    pub(crate) fn invalid_key(input: &str, reason: &'static str) -> Self {
        FlamestoreError::InvalidKey {
            input: input.to_string(),
            reason,
        }
    }
}
