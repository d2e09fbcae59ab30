//! Engine Module
//!
//! Ties the log, the batch codec and the memtable together.
//!
//! ## Responsibilities
//! - Replay the log into a fresh memtable on startup
//! - Assign sequence numbers to incoming batches
//! - Make every batch durable in the log before it becomes visible
//! - Apply the configured sync strategy

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::batch::WriteBatch;
use crate::config::{Config, WalSyncStrategy};
use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};
use crate::wal::{FileSink, LogWriter, RecoveryResult, WalRecovery, BLOCK_SIZE};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (write/put/delete/sync): serialized by the `write` mutex,
///   which covers sequence assignment, the log append and the memtable insert
///   so they appear atomic to other writers.
/// - **Reads** (get): go straight to the memtable's internal RwLock.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Path of the log file
    wal_path: PathBuf,

    /// In-memory table (internal RwLock)
    memtable: MemTable,

    /// Everything the write path mutates
    write: Mutex<WriteState>,

    /// What the startup replay found
    recovery: RecoveryResult,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("wal_path", &self.wal_path)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

struct WriteState {
    log: LogWriter<FileSink>,
    last_sequence: u64,
    /// Entries appended since the last sync
    unsynced: usize,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Replay the log if it exists
    /// 3. Cut a torn tail, or step past a damaged one
    /// 4. Resume appending at the end of the existing log
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Step 1: Create data directory if it doesn't exist
        fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        // Step 2: Replay the log into a fresh memtable
        let memtable = MemTable::new();
        let recovery = if wal_path.exists() {
            WalRecovery::replay(&wal_path, &memtable, config.read_options())?
        } else {
            RecoveryResult::default()
        };

        if recovery.records_read > 0 || recovery.corruptions > 0 {
            info!(
                recovered = recovery.batches_recovered,
                rejected = recovery.batches_rejected,
                corruptions = recovery.corruptions,
                last_sequence = recovery.last_sequence,
                "replayed existing log"
            );
        }

        // Step 3: Make sure new records land where a reader will find them
        if wal_path.exists() {
            Self::prepare_tail(&wal_path, &recovery)?;
        }

        // Step 4: Keep appending to the same file, picking up mid-block
        let (sink, length) = FileSink::open_append(&wal_path)?;
        let log = LogWriter::with_offset(sink, length);
        debug!(path = %wal_path.display(), length, "log opened for append");

        Ok(Self {
            write: Mutex::new(WriteState {
                log,
                last_sequence: recovery.last_sequence,
                unsynced: 0,
            }),
            config,
            wal_path,
            memtable,
            recovery,
        })
    }

    /// Deal with bytes after the last intact record.
    ///
    /// A torn write is cut off, so the next record follows the last intact
    /// one. Once any damage was reported the bytes are kept instead and the
    /// log moves on to the next block: the reader drops the rest of a block
    /// after a corruption, and would drop new records appended there with it.
    fn prepare_tail(wal_path: &Path, recovery: &RecoveryResult) -> Result<()> {
        let file = fs::OpenOptions::new().write(true).open(wal_path)?;
        let length = file.metadata()?.len();
        if length <= recovery.valid_length {
            return Ok(());
        }

        if recovery.was_truncated && recovery.corruptions == 0 {
            warn!(
                from = length,
                to = recovery.valid_length,
                "truncating torn log tail"
            );
            file.set_len(recovery.valid_length)?;
        } else {
            let block = BLOCK_SIZE as u64;
            let next_block = length.div_ceil(block) * block;
            warn!(
                length,
                valid_length = recovery.valid_length,
                next_block,
                "unreadable bytes at end of log, resuming at next block"
            );
            // Extends with zeros, which the reader skips as padding
            file.set_len(next_block)?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::open(config)
    }

    /// Apply a batch atomically.
    ///
    /// Returns the sequence number given to the first entry. Empty batches
    /// are not logged and return the current last sequence.
    pub fn write(&self, mut batch: WriteBatch) -> Result<u64> {
        let mut state = self.write.lock();
        if batch.is_empty() {
            return Ok(state.last_sequence);
        }
        // A batch built from raw contents must never reach the log malformed
        batch.validate()?;

        let first_sequence = state.last_sequence + 1;
        batch.set_sequence(first_sequence);

        // Step 1: Log first (durability guarantee)
        state.log.add_record(batch.contents())?;
        state.unsynced += batch.count() as usize;

        let sync_due = match self.config.wal_sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => state.unsynced >= count,
        };
        if sync_due {
            state.log.sync()?;
            state.unsynced = 0;
        }

        // Step 2: Make the batch visible
        batch.insert_into(&self.memtable)?;
        state.last_sequence += batch.count() as u64;

        Ok(first_sequence)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<u64> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.memtable.get(key)? {
            MemTableEntry::Value(value) => Some(value),
            MemTableEntry::Tombstone => None,
        }
    }

    /// Force everything logged so far to disk
    pub fn sync(&self) -> Result<()> {
        let mut state = self.write.lock();
        state.log.sync()?;
        state.unsynced = 0;
        Ok(())
    }

    /// Close the engine gracefully, syncing the log
    pub fn close(self) -> Result<()> {
        let mut state = self.write.into_inner();
        state.log.sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Sequence number of the last applied entry
    pub fn last_sequence(&self) -> u64 {
        self.write.lock().last_sequence
    }

    /// Entries logged since the last sync
    pub fn unsynced_entries(&self) -> usize {
        self.write.lock().unsynced
    }

    /// Get the log file path
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// What the startup replay found
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    pub fn memtable(&self) -> &MemTable {
        &self.memtable
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
