// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 The banksim contributors
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

//! Readers-writer protected key/value configuration store.
//!
//! Any number of readers may run concurrently; a write requires exclusive
//! access. `parking_lot::RwLock` is task-fair: once a writer is waiting,
//! new readers queue behind it, so a writer is never starved by a stream
//! of readers.
//!
//! Readers always receive owned copies, never references, so no read
//! outlives the lock.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// Live system configuration shared between actors.
#[derive(Debug)]
pub struct ConfigStore {
    entries: RwLock<HashMap<String, String>>,
}

impl ConfigStore {
    /// Creates a store seeded with the stock simulation keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from an explicit initial key/value set, for a
    /// configuration-loading collaborator to seed before actors start.
    pub fn from_entries(entries: HashMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Returns a copy of the value for `key`, if present.
    pub fn read(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    /// Reads and parses a value in one step. `None` if the key is missing
    /// or the value does not parse.
    pub fn read_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.read(key).and_then(|value| value.parse().ok())
    }

    /// Returns a copy of the whole configuration map.
    pub fn read_all(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }

    /// Updates one entry under the exclusive lock, returning the previous
    /// value if any.
    pub fn write(&self, key: &str, value: &str) -> Option<String> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_owned(), value.to_owned());
        debug!(key, old = previous.as_deref(), new = value, "config updated");
        previous
    }

    /// Updates several entries in one exclusive critical section.
    pub fn write_many(&self, updates: HashMap<String, String>) {
        let mut entries = self.entries.write();
        for (key, value) in updates {
            entries.insert(key, value);
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert("transaction_limit".into(), "10000".into());
        entries.insert("fraud_engines".into(), "3".into());
        entries.insert("queue_capacity".into(), "10".into());
        entries.insert("analysis_timeout_ms".into(), "5000".into());
        entries.insert("debug_mode".into(), "false".into());
        Self {
            entries: RwLock::new(entries),
        }
    }
}
