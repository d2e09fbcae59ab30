//! WAL Writer
//!
//! Frames logical records into block-confined physical records.

use tracing::{debug, trace};

use crate::error::Result;
use super::file::WritableFile;
use super::format::{
    encode_header, type_checksum_table, RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_RECORD_TYPE,
};

/// Zero bytes used to pad a block tail too small for a header
const PADDING: [u8; HEADER_SIZE - 1] = [0; HEADER_SIZE - 1];

/// Appends logical records to a log sink
///
/// Not internally synchronized: one writer per log file, and callers that
/// share it across threads must wrap it in a mutex.
pub struct LogWriter<W: WritableFile> {
    dest: W,

    /// Offset inside the current block
    block_offset: usize,

    /// crc32c of each type byte, precomputed to save work per record
    type_crc: [u32; MAX_RECORD_TYPE as usize + 1],
}

impl<W: WritableFile> LogWriter<W> {
    /// Create a writer for an empty destination
    pub fn new(dest: W) -> Self {
        Self::with_offset(dest, 0)
    }

    /// Create a writer that appends to a destination already holding
    /// `dest_length` bytes
    pub fn with_offset(dest: W, dest_length: u64) -> Self {
        let block_offset = (dest_length % BLOCK_SIZE as u64) as usize;
        if block_offset != 0 {
            debug!(dest_length, block_offset, "resuming log inside a partially filled block");
        }

        Self {
            dest,
            block_offset,
            type_crc: type_checksum_table(),
        }
    }

    /// Append one logical record, fragmenting it across blocks as needed.
    ///
    /// On error the fragments already emitted stay in the sink; the whole
    /// record must be treated as failed.
    pub fn add_record(&mut self, record: &[u8]) -> Result<()> {
        let mut left = record;
        let mut begin = true;

        // Runs at least once so an empty record still yields one Full record
        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Switch to a new block, even if the padding fails to land
                self.block_offset = 0;
                if leftover > 0 {
                    debug!(leftover, "padding block tail");
                    self.dest.append(&PADDING[..leftover])?;
                }
            }

            let available = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = left.len().min(available);
            let end = fragment_length == left.len();

            let record_type = RecordType::for_fragment(begin, end);
            self.emit_physical_record(record_type, &left[..fragment_length])?;

            left = &left[fragment_length..];
            begin = false;

            if left.is_empty() {
                return Ok(());
            }
        }
    }

    /// Flush the sink
    pub fn flush(&mut self) -> Result<()> {
        self.dest.flush()?;
        Ok(())
    }

    /// Make everything appended so far durable
    pub fn sync(&mut self) -> Result<()> {
        self.dest.sync()?;
        Ok(())
    }

    /// Offset inside the current block where the next header would start
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    pub fn get_ref(&self) -> &W {
        &self.dest
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dest
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    fn emit_physical_record(&mut self, record_type: RecordType, payload: &[u8]) -> Result<()> {
        debug_assert!(self.block_offset + HEADER_SIZE + payload.len() <= BLOCK_SIZE);

        let crc = crc32c::crc32c_append(self.type_crc[record_type.tag() as usize], payload);
        let header = encode_header(record_type, crc, payload.len());

        trace!(
            ?record_type,
            length = payload.len(),
            block_offset = self.block_offset,
            "emitting physical record"
        );

        let result = self
            .dest
            .append(&header)
            .and_then(|_| self.dest.append(payload))
            .and_then(|_| self.dest.flush());

        // The offset tracks the intended stream position even if the sink
        // failed, so it advances unconditionally.
        self.block_offset += HEADER_SIZE + payload.len();

        result?;
        Ok(())
    }
}
