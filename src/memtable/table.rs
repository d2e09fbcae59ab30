//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use super::MemTableEntry;

/// Per-entry bookkeeping overhead counted into `size()`
const ENTRY_OVERHEAD: usize = 8;

/// In-memory table for recent writes
pub struct MemTable {
    /// key -> (sequence of the last update, entry)
    data: RwLock<BTreeMap<Vec<u8>, (u64, MemTableEntry)>>,

    /// Approximate size in bytes
    size: AtomicUsize,

    /// Highest sequence number applied
    last_sequence: AtomicU64,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            last_sequence: AtomicU64::new(0),
        }
    }

    /// Get the current entry for a key
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        self.data.read().get(key).map(|(_, entry)| entry.clone())
    }

    /// Get the current entry for a key together with its sequence number
    pub fn get_with_sequence(&self, key: &[u8]) -> Option<(u64, MemTableEntry)> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair. Returns the new approximate size.
    pub fn put(&self, sequence: u64, key: Vec<u8>, value: Vec<u8>) -> usize {
        self.apply(sequence, key, MemTableEntry::Value(value))
    }

    /// Delete a key (inserts a tombstone). Returns the new approximate size.
    pub fn delete(&self, sequence: u64, key: Vec<u8>) -> usize {
        self.apply(sequence, key, MemTableEntry::Tombstone)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Highest sequence number applied so far
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Snapshot of all entries in key order
    pub fn entries(&self) -> Vec<(Vec<u8>, MemTableEntry)> {
        self.data
            .read()
            .iter()
            .map(|(key, (_, entry))| (key.clone(), entry.clone()))
            .collect()
    }

    fn apply(&self, sequence: u64, key: Vec<u8>, entry: MemTableEntry) -> usize {
        let mut data = self.data.write();
        let added = entry_size(&key, &entry);

        let size = match data.get(&key) {
            // A replay of an older update must not clobber a newer one
            Some((existing, _)) if *existing > sequence => return self.size(),
            Some((_, old)) => {
                let removed = entry_size(&key, old);
                let previous = self.size.load(Ordering::Acquire);
                previous - removed + added
            }
            None => self.size.load(Ordering::Acquire) + added,
        };

        data.insert(key, (sequence, entry));
        self.size.store(size, Ordering::Release);
        self.last_sequence.fetch_max(sequence, Ordering::AcqRel);
        size
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_size(key: &[u8], entry: &MemTableEntry) -> usize {
    let value_len = match entry {
        MemTableEntry::Value(value) => value.len(),
        MemTableEntry::Tombstone => 0,
    };
    key.len() + value_len + ENTRY_OVERHEAD
}
