//! MemTable Tests
//!
//! Tests verify:
//! - Basic put/get/delete with sequence numbers
//! - Older updates never hiding newer ones (replay order safety)
//! - Size tracking
//! - Sorted snapshots
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use blockwal::memtable::{MemTable, MemTableEntry};

/// Per-entry overhead counted into size()
const OVERHEAD: usize = 8;

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new();
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert_eq!(memtable.last_sequence(), 0);
    assert!(memtable.is_empty());
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new();

    memtable.put(1, b"key1".to_vec(), b"value1".to_vec());

    assert_eq!(memtable.get(b"key1"), Some(MemTableEntry::Value(b"value1".to_vec())));
    assert_eq!(
        memtable.get_with_sequence(b"key1"),
        Some((1, MemTableEntry::Value(b"value1".to_vec())))
    );
    assert_eq!(memtable.get(b"nonexistent"), None);
}

#[test]
fn test_put_overwrites_existing() {
    let memtable = MemTable::new();

    memtable.put(1, b"key1".to_vec(), b"value1".to_vec());
    memtable.put(2, b"key1".to_vec(), b"value2".to_vec());

    assert_eq!(memtable.entry_count(), 1);
    assert_eq!(memtable.get(b"key1"), Some(MemTableEntry::Value(b"value2".to_vec())));
    assert_eq!(memtable.last_sequence(), 2);
}

// =============================================================================
// Delete / Tombstone Tests
// =============================================================================

#[test]
fn test_delete_creates_tombstone() {
    let memtable = MemTable::new();

    memtable.put(1, b"key1".to_vec(), b"value1".to_vec());
    memtable.delete(2, b"key1".to_vec());

    assert_eq!(memtable.get(b"key1"), Some(MemTableEntry::Tombstone));
    assert_eq!(memtable.entry_count(), 1); // Tombstone still counts as entry
}

#[test]
fn test_put_after_delete() {
    let memtable = MemTable::new();

    memtable.put(1, b"key1".to_vec(), b"value1".to_vec());
    memtable.delete(2, b"key1".to_vec());
    memtable.put(3, b"key1".to_vec(), b"value2".to_vec());

    assert_eq!(memtable.get(b"key1"), Some(MemTableEntry::Value(b"value2".to_vec())));
}

// =============================================================================
// Sequence Ordering Tests
// =============================================================================

#[test]
fn test_older_update_is_ignored() {
    let memtable = MemTable::new();

    memtable.put(10, b"key".to_vec(), b"new".to_vec());
    let size = memtable.size();

    memtable.put(5, b"key".to_vec(), b"old".to_vec());
    memtable.delete(7, b"key".to_vec());

    assert_eq!(
        memtable.get_with_sequence(b"key"),
        Some((10, MemTableEntry::Value(b"new".to_vec())))
    );
    assert_eq!(memtable.size(), size);
    assert_eq!(memtable.last_sequence(), 10);
}

#[test]
fn test_same_sequence_replaces() {
    // Replaying the same entry twice is harmless
    let memtable = MemTable::new();

    memtable.put(4, b"key".to_vec(), b"value".to_vec());
    memtable.put(4, b"key".to_vec(), b"value".to_vec());

    assert_eq!(memtable.entry_count(), 1);
    assert_eq!(memtable.size(), 3 + 5 + OVERHEAD);
}

#[test]
fn test_last_sequence_tracks_maximum() {
    let memtable = MemTable::new();

    memtable.put(3, b"a".to_vec(), b"1".to_vec());
    memtable.put(9, b"b".to_vec(), b"2".to_vec());
    memtable.put(6, b"c".to_vec(), b"3".to_vec());

    assert_eq!(memtable.last_sequence(), 9);
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_tracking_put() {
    let memtable = MemTable::new();

    let size = memtable.put(1, b"key".to_vec(), b"value".to_vec());

    assert_eq!(size, b"key".len() + b"value".len() + OVERHEAD);
    assert_eq!(memtable.size(), size);
}

#[test]
fn test_size_tracking_overwrite() {
    let memtable = MemTable::new();

    let size_after_first = memtable.put(1, b"key".to_vec(), b"short".to_vec());
    let size_after_second = memtable.put(2, b"key".to_vec(), b"much_longer_value".to_vec());

    assert_eq!(size_after_first, b"key".len() + b"short".len() + OVERHEAD);
    assert_eq!(size_after_second, b"key".len() + b"much_longer_value".len() + OVERHEAD);
}

#[test]
fn test_size_tracking_delete() {
    let memtable = MemTable::new();

    memtable.put(1, b"key".to_vec(), b"value".to_vec());
    let size_after_delete = memtable.delete(2, b"key".to_vec());

    assert_eq!(size_after_delete, b"key".len() + OVERHEAD); // Tombstone = just key
}

// =============================================================================
// Snapshot Tests
// =============================================================================

#[test]
fn test_entries_sorted_order() {
    let memtable = MemTable::new();

    // Insert in random order
    memtable.put(1, b"cherry".to_vec(), b"3".to_vec());
    memtable.put(2, b"apple".to_vec(), b"1".to_vec());
    memtable.delete(3, b"banana".to_vec());

    let entries = memtable.entries();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, b"apple");
    assert_eq!(entries[1], (b"banana".to_vec(), MemTableEntry::Tombstone));
    assert_eq!(entries[2].0, b"cherry");
}

#[test]
fn test_entries_is_a_snapshot() {
    let memtable = MemTable::new();

    memtable.put(1, b"key".to_vec(), b"value".to_vec());
    let entries = memtable.entries();
    memtable.put(2, b"key".to_vec(), b"modified".to_vec());

    assert_eq!(entries[0].1, MemTableEntry::Value(b"value".to_vec()));
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_empty_key_and_value() {
    let memtable = MemTable::new();

    memtable.put(1, vec![], vec![]);

    assert_eq!(memtable.get(&[]), Some(MemTableEntry::Value(vec![])));
}

#[test]
fn test_many_entries() {
    let memtable = MemTable::new();

    for i in 0..1000u64 {
        let key = format!("key{:04}", i).into_bytes();
        let value = format!("value{}", i).into_bytes();
        memtable.put(i + 1, key, value);
    }

    assert_eq!(memtable.entry_count(), 1000);
    assert_eq!(memtable.last_sequence(), 1000);

    let entries = memtable.entries();
    for pair in entries.windows(2) {
        assert!(pair[0].0 < pair[1].0);
    }
}

// =============================================================================
// Concurrent Access Tests (Basic)
// =============================================================================

#[test]
fn test_concurrent_reads() {
    let memtable = Arc::new(MemTable::new());
    memtable.put(1, b"key".to_vec(), b"value".to_vec());

    let mut handles = vec![];

    for _ in 0..10 {
        let mt = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                assert_eq!(mt.get(b"key"), Some(MemTableEntry::Value(b"value".to_vec())));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_writes() {
    let memtable = Arc::new(MemTable::new());

    let mut handles = vec![];

    for i in 0..10u64 {
        let mt = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for j in 0..10u64 {
                let key = format!("key{}_{}", i, j).into_bytes();
                let value = format!("value{}_{}", i, j).into_bytes();
                mt.put(i * 10 + j + 1, key, value);
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memtable.entry_count(), 100);
    assert_eq!(memtable.last_sequence(), 100);
}
