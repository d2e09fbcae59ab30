//! Write Batch Module
//!
//! The logical payload carried inside a log record: a base sequence number
//! followed by a counted list of Put/Delete entries.
//!
//! ## Responsibilities
//! - Build batches incrementally
//! - Encode/decode the batch wire format
//! - Replay decoded entries into any `BatchHandler`
//! - Merge batches for group commit

pub mod coding;
mod write_batch;

pub use write_batch::{
    BatchHandler, Operation, WriteBatch, BATCH_HEADER_SIZE, TAG_DELETION, TAG_VALUE,
};
