//! # blockwal
//!
//! A block-framed write-ahead log with:
//! - 32 KiB blocks, 7-byte record headers and masked CRC32C checksums
//! - Fragmentation of large records across blocks
//! - Crash recovery that separates torn tails from real corruption
//! - Write batches (sequence number + tagged Put/Delete entries) as payloads
//!
//! ## Architecture Overview
//!
//! ```text
//!   caller ──► WriteBatch ──► LogWriter ──► WritableFile
//!                (encode)      (frame)        (append/flush/sync)
//!
//!   SequentialFile ──► LogReader ──► WriteBatch ──► BatchHandler
//!                      (reassemble)   (decode)       (MemTable)
//! ```
//!
//! The [`Engine`] ties the pieces together the way a storage engine would:
//! one mutex around sequence assignment, log append and memtable insert.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod batch;
pub mod memtable;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{WalError, Result};
pub use config::Config;
pub use engine::Engine;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blockwal
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
