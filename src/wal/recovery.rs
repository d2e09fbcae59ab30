//! WAL Recovery
//!
//! Handles crash recovery by replaying the write batches stored in a log.

use std::path::Path;

use tracing::{info, warn};

use crate::batch::{WriteBatch, BATCH_HEADER_SIZE};
use crate::config::ReadOptions;
use crate::error::{Result, WalError};
use crate::memtable::MemTable;
use super::file::{FileSource, SequentialFile};
use super::reader::LogReader;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Logical records read from the log
    pub records_read: u64,

    /// Batches that decoded cleanly
    pub batches_recovered: u64,

    /// Records skipped because their batch encoding was malformed
    pub batches_rejected: u64,

    /// Corruption events (physical damage and undersized records)
    pub corruptions: u64,

    /// Bytes dropped because of corruption
    pub bytes_dropped: u64,

    /// Sequence number of the last recovered entry (0 if none)
    pub last_sequence: u64,

    /// Whether the log ended in a partially written record
    pub was_truncated: bool,

    /// Offset just past the last intact record; trailing bytes beyond it
    /// hold nothing recoverable
    pub valid_length: u64,
}

impl WalRecovery {
    /// Recover all intact batches from a log file, in log order
    pub fn recover(path: &Path, options: ReadOptions) -> Result<(Vec<WriteBatch>, RecoveryResult)> {
        let source = FileSource::open(path)?;
        let mut batches = Vec::new();
        let result = Self::recover_from(source, options, |batch| {
            batch.validate()?;
            batches.push(batch);
            Ok(())
        })?;
        Ok((batches, result))
    }

    /// Replay a log file into `memtable`
    pub fn replay(path: &Path, memtable: &MemTable, options: ReadOptions) -> Result<RecoveryResult> {
        let source = FileSource::open(path)?;
        Self::recover_from(source, options, |batch| batch.insert_into(memtable))
    }

    /// Check the integrity of a log file without applying anything
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let source = FileSource::open(path)?;
        Self::recover_from(source, ReadOptions::default(), |batch| batch.validate())
    }

    /// Read every record of `source`, decode it as a batch and hand it to
    /// `apply`.
    ///
    /// Corrupted spans and malformed batches are counted and skipped unless
    /// `paranoid_checks` is set, in which case the first one aborts recovery.
    pub fn recover_from<F, A>(source: F, options: ReadOptions, mut apply: A) -> Result<RecoveryResult>
    where
        F: SequentialFile,
        A: FnMut(WriteBatch) -> Result<()>,
    {
        let mut reader = LogReader::new(source, options.verify_checksums, 0);
        let mut result = RecoveryResult::default();
        // Undersized records, counted on top of the reader's own corruptions
        let mut short_records = 0u64;
        let mut short_bytes = 0u64;

        loop {
            let record = reader.read_record()?;

            if options.paranoid_checks && reader.stats().corruptions > 0 {
                return Err(WalError::Corruption(format!(
                    "{} bytes dropped before offset {}",
                    reader.stats().bytes_dropped,
                    reader.last_record_offset()
                )));
            }

            let Some(record) = record else { break };
            result.records_read += 1;

            if record.len() < BATCH_HEADER_SIZE {
                warn!(bytes = record.len(), "log record too small for a batch");
                if options.paranoid_checks {
                    return Err(WalError::Corruption("log record too small".to_string()));
                }
                short_records += 1;
                short_bytes += record.len() as u64;
                continue;
            }

            let batch = WriteBatch::from_contents(&record)?;
            let sequence = batch.sequence();
            let count = batch.count() as u64;

            match apply(batch) {
                Ok(()) => {
                    result.batches_recovered += 1;
                    if count > 0 {
                        result.last_sequence = result.last_sequence.max(sequence + count - 1);
                    }
                }
                Err(e) if e.is_corruption() && !options.paranoid_checks => {
                    warn!(error = %e, offset = reader.last_record_offset(), "skipping malformed batch");
                    result.batches_rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let stats = reader.stats();
        result.corruptions = stats.corruptions + short_records;
        result.bytes_dropped = stats.bytes_dropped + short_bytes;
        result.was_truncated = stats.truncated_tail;
        result.valid_length = reader.last_record_end();

        info!(
            records = result.records_read,
            batches = result.batches_recovered,
            rejected = result.batches_rejected,
            corruptions = result.corruptions,
            last_sequence = result.last_sequence,
            truncated = result.was_truncated,
            "log recovery finished"
        );

        Ok(result)
    }
}
