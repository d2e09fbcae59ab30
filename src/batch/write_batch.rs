//! Write batch encoding
//!
//! ## Wire Format
//! ```text
//! ┌──────────────┬───────────┬──────────────────────────────────┐
//! │ Sequence (8) │ Count (4) │ Entries                          │
//! └──────────────┴───────────┴──────────────────────────────────┘
//! ```
//!
//! ### Entry by Tag
//! - PUT (0x01):    tag + varint32 key_len + key + varint32 value_len + value
//! - DELETE (0x00): tag + varint32 key_len + key
//!
//! Entry `i` carries sequence number `sequence + i`.

use bytes::{Buf, BufMut};

use crate::error::{Result, WalError};
use crate::memtable::MemTable;
use super::coding::{
    decode_fixed32, decode_fixed64, encode_fixed32, encode_fixed64, get_length_prefixed_slice,
    put_length_prefixed_slice,
};

/// Header size: 8 bytes sequence + 4 bytes count
pub const BATCH_HEADER_SIZE: usize = 12;

/// Entry tag for a deletion
pub const TAG_DELETION: u8 = 0x00;

/// Entry tag for a value
pub const TAG_VALUE: u8 = 0x01;

/// Operations carried by a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

/// Receives the entries of a batch in encoded order
pub trait BatchHandler {
    fn put(&mut self, sequence: u64, key: &[u8], value: &[u8]);
    fn delete(&mut self, sequence: u64, key: &[u8]);
}

/// Borrowed view of one decoded entry
enum Entry<'a> {
    Put { key: &'a [u8], value: &'a [u8] },
    Delete { key: &'a [u8] },
}

/// A group of updates applied atomically, and the payload of one log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    /// Create an empty batch (sequence 0, count 0)
    pub fn new() -> Self {
        Self {
            rep: vec![0u8; BATCH_HEADER_SIZE],
        }
    }

    /// Encode `operations` as a batch starting at `sequence`
    pub fn from_operations<'a>(
        sequence: u64,
        operations: impl IntoIterator<Item = &'a Operation>,
    ) -> Self {
        let mut batch = Self::new();
        batch.set_sequence(sequence);
        for op in operations {
            match op {
                Operation::Put { key, value } => batch.put(key, value),
                Operation::Delete { key } => batch.delete(key),
            }
        }
        batch
    }

    /// Wrap raw contents read back from the log
    pub fn from_contents(contents: &[u8]) -> Result<Self> {
        let mut batch = Self::new();
        batch.set_contents(contents)?;
        Ok(batch)
    }

    /// Store the mapping key -> value
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.put_u8(TAG_VALUE);
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
    }

    /// Erase the mapping for key, if any
    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.put_u8(TAG_DELETION);
        put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Drop all buffered updates
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    /// Size of the encoded batch. Cheap, no decoding involved.
    pub fn approximate_size(&self) -> usize {
        self.rep.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Copy the entries of `source` to the end of this batch.
    ///
    /// The counts are summed; this batch keeps its own base sequence.
    pub fn append(&mut self, source: &WriteBatch) {
        debug_assert!(source.rep.len() >= BATCH_HEADER_SIZE);
        self.set_count(self.count() + source.count());
        self.rep.extend_from_slice(&source.rep[BATCH_HEADER_SIZE..]);
    }

    /// Feed every entry to `handler` with sequence numbers `sequence()`,
    /// `sequence() + 1`, ...
    ///
    /// The whole batch is validated first, so a malformed batch reaches the
    /// handler not at all.
    pub fn iterate(&self, handler: &mut impl BatchHandler) -> Result<()> {
        let entries = self.decode_entries()?;
        let mut sequence = self.sequence();
        for entry in entries {
            match entry {
                Entry::Put { key, value } => handler.put(sequence, key, value),
                Entry::Delete { key } => handler.delete(sequence, key),
            }
            sequence = sequence.wrapping_add(1);
        }
        Ok(())
    }

    /// Check the encoding without dispatching anything
    pub fn validate(&self) -> Result<()> {
        self.decode_entries().map(|_| ())
    }

    /// Decode the batch into owned operations paired with their sequence numbers
    pub fn operations(&self) -> Result<Vec<(u64, Operation)>> {
        struct Collector(Vec<(u64, Operation)>);

        impl BatchHandler for Collector {
            fn put(&mut self, sequence: u64, key: &[u8], value: &[u8]) {
                self.0.push((
                    sequence,
                    Operation::Put {
                        key: key.to_vec(),
                        value: value.to_vec(),
                    },
                ));
            }

            fn delete(&mut self, sequence: u64, key: &[u8]) {
                self.0.push((sequence, Operation::Delete { key: key.to_vec() }));
            }
        }

        let mut collector = Collector(Vec::with_capacity(self.count() as usize));
        self.iterate(&mut collector)?;
        Ok(collector.0)
    }

    // =========================================================================
    // Raw access (used by the log, recovery and batch grouping)
    // =========================================================================

    /// Number of entries, read straight from the header
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[8..])
    }

    pub fn set_count(&mut self, count: u32) {
        encode_fixed32(&mut self.rep[8..], count);
    }

    /// Sequence number of the first entry
    pub fn sequence(&self) -> u64 {
        decode_fixed64(&self.rep)
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        encode_fixed64(&mut self.rep, sequence);
    }

    /// Encoded bytes, as written to the log
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Replace the encoded bytes wholesale
    pub fn set_contents(&mut self, contents: &[u8]) -> Result<()> {
        if contents.len() < BATCH_HEADER_SIZE {
            return Err(WalError::MalformedBatch(format!(
                "too small: {} bytes, header needs {}",
                contents.len(),
                BATCH_HEADER_SIZE
            )));
        }
        self.rep.clear();
        self.rep.extend_from_slice(contents);
        Ok(())
    }

    pub fn byte_size(&self) -> usize {
        self.rep.len()
    }

    /// Apply every entry to `memtable`
    pub fn insert_into(&self, memtable: &MemTable) -> Result<()> {
        let mut inserter = MemTableInserter { memtable };
        self.iterate(&mut inserter)
    }

    fn decode_entries(&self) -> Result<Vec<Entry<'_>>> {
        if self.rep.len() < BATCH_HEADER_SIZE {
            return Err(WalError::MalformedBatch("too small".to_string()));
        }

        let count = self.count() as usize;
        if count > 0 && self.sequence().checked_add(count as u64 - 1).is_none() {
            return Err(WalError::MalformedBatch(format!(
                "sequence {} overflows with {} entries",
                self.sequence(),
                count
            )));
        }

        let mut input = &self.rep[BATCH_HEADER_SIZE..];
        // Each entry takes at least two bytes; do not trust the header for capacity
        let mut entries = Vec::with_capacity(count.min(input.len() / 2));

        while input.has_remaining() {
            if entries.len() == count {
                return Err(WalError::MalformedBatch(format!(
                    "{} trailing bytes after {} entries",
                    input.len(),
                    count
                )));
            }

            let tag = input.get_u8();
            match tag {
                TAG_VALUE => {
                    let key = get_length_prefixed_slice(&mut input);
                    let value = key.and_then(|_| get_length_prefixed_slice(&mut input));
                    match (key, value) {
                        (Some(key), Some(value)) => entries.push(Entry::Put { key, value }),
                        _ => return Err(WalError::MalformedBatch("bad Put entry".to_string())),
                    }
                }
                TAG_DELETION => match get_length_prefixed_slice(&mut input) {
                    Some(key) => entries.push(Entry::Delete { key }),
                    None => return Err(WalError::MalformedBatch("bad Delete entry".to_string())),
                },
                other => {
                    return Err(WalError::MalformedBatch(format!(
                        "unknown entry tag 0x{:02x}",
                        other
                    )))
                }
            }
        }

        if entries.len() != count {
            return Err(WalError::MalformedBatch(format!(
                "wrong count: header says {}, found {}",
                count,
                entries.len()
            )));
        }

        Ok(entries)
    }
}

/// Replays batch entries into a memtable
struct MemTableInserter<'a> {
    memtable: &'a MemTable,
}

impl BatchHandler for MemTableInserter<'_> {
    fn put(&mut self, sequence: u64, key: &[u8], value: &[u8]) {
        self.memtable.put(sequence, key.to_vec(), value.to_vec());
    }

    fn delete(&mut self, sequence: u64, key: &[u8]) {
        self.memtable.delete(sequence, key.to_vec());
    }
}
