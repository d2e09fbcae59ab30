//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Frame logical records into block-confined physical records
//! - Masked CRC32C checksums for corruption detection
//! - Reassemble records on read, isolating damaged spans
//! - Crash recovery and replay of write batches
//!
//! ## File Format
//! ```text
//! ┌──────────────────────── block (32 KiB) ────────────────────────┐
//! │ ┌─────────┬─────────┬──────────┬─────────┐ ┌──────┐     ┌─────┐ │
//! │ │ CRC (4) │ Len (2) │ Type (1) │ Payload │ │ ...  │ ... │ pad │ │
//! │ └─────────┴─────────┴──────────┴─────────┘ └──────┘     └─────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A logical record that does not fit in the rest of a block is split into
//! First / Middle* / Last fragments. Fewer than 7 bytes left in a block are
//! zero-filled and the next record starts at the following block.

pub mod format;
mod file;
mod writer;
mod reader;
mod recovery;

pub use format::{RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_PAYLOAD};
pub use file::{FileSink, FileSource, MemorySource, SequentialFile, WritableFile};
pub use writer::LogWriter;
pub use reader::{LogReader, ReadStats, Records, Reporter};
pub use recovery::{RecoveryResult, WalRecovery};
