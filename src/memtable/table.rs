//! MemTable implementation
//!
//! HashMap-based memtable with RwLock for concurrency.

use std::collections::HashMap;

use parking_lot::RwLock;

/// In-memory key-value map
pub struct MemTable {
    data: RwLock<HashMap<String, String>>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::from_map(HashMap::new())
    }

    /// Wrap a fully built map (used after replay)
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(map),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Run `f` with exclusive access to the map
    ///
    /// Readers are blocked for the duration of `f`.
    pub fn update<R>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> R) -> R {
        let mut data = self.data.write();
        f(&mut data)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copy of all pairs, sorted by key
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
