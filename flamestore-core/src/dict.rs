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

//! Per-application symbol dictionary

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps symbol text to compact identifiers shared by all trees of one
/// application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    symbols: Vec<Vec<u8>>,
    ids: HashMap<Vec<u8>, u32>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `symbol`, returning its identifier
    pub fn put(&mut self, symbol: &[u8]) -> u32 {
        if let Some(id) = self.ids.get(symbol) {
            return *id;
        }
        let id = self.symbols.len() as u32;
        self.symbols.push(symbol.to_vec());
        self.ids.insert(symbol.to_vec(), id);
        id
    }

    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.symbols.get(id as usize).map(Vec::as_slice)
    }

    pub fn id_of(&self, symbol: &[u8]) -> Option<u32> {
        self.ids.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
