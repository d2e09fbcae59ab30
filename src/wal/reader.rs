//! WAL Reader
//!
//! Reassembles logical records from physical records and sorts anomalies
//! into corruption, torn tails and clean end of log.

use tracing::{debug, warn};

use crate::error::{Result, WalError};
use super::file::SequentialFile;
use super::format::{decode_header, unmask_checksum, RecordType, BLOCK_SIZE, HEADER_SIZE};

/// Receives a notification for every span of bytes dropped as corrupt
pub trait Reporter {
    /// `bytes` is the approximate number of bytes dropped
    fn corruption(&mut self, bytes: usize, reason: &WalError);
}

impl<F: FnMut(usize, &WalError)> Reporter for F {
    fn corruption(&mut self, bytes: usize, reason: &WalError) {
        self(bytes, reason)
    }
}

/// Counters collected while reading a log
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Logical records returned to the caller
    pub records: u64,

    /// Corruption events reported
    pub corruptions: u64,

    /// Bytes dropped because of corruption
    pub bytes_dropped: u64,

    /// The log ended inside a record (a write torn by a crash)
    pub truncated_tail: bool,
}

/// Outcome of reading one physical record
enum Physical {
    Record {
        tag: u8,
        start: usize,
        length: usize,
        offset: u64,
    },
    /// End of the source
    Eof,
    /// Damaged or skipped record; the rest of its block may be gone
    Bad,
    /// Zero-filled space that was allocated but never written
    Unwritten,
}

/// Reads logical records from a log source
pub struct LogReader<F: SequentialFile> {
    file: F,
    reporter: Option<Box<dyn Reporter>>,
    verify_checksums: bool,

    /// One block worth of bytes; `buf_start..buf_end` is still unread
    backing: Vec<u8>,
    buf_start: usize,
    buf_end: usize,

    /// Last read returned less than a full block
    eof: bool,

    /// Offset of the last record returned by `read_record`
    last_record_offset: u64,

    /// Offset just past the final fragment of that record
    last_record_end: u64,

    /// Offset of the first byte past the buffered block
    end_of_buffer_offset: u64,

    /// Records starting before this offset are skipped
    initial_offset: u64,
    skipped_to_initial: bool,

    /// Dropping fragments until the next Full/First boundary
    resyncing: bool,

    stats: ReadStats,
}

impl<F: SequentialFile> LogReader<F> {
    /// Create a reader that starts at the first record at or after
    /// `initial_offset`
    pub fn new(file: F, verify_checksums: bool, initial_offset: u64) -> Self {
        Self {
            file,
            reporter: None,
            verify_checksums,
            backing: vec![0u8; BLOCK_SIZE],
            buf_start: 0,
            buf_end: 0,
            eof: false,
            last_record_offset: 0,
            last_record_end: 0,
            end_of_buffer_offset: 0,
            initial_offset,
            skipped_to_initial: initial_offset == 0,
            resyncing: initial_offset > 0,
            stats: ReadStats::default(),
        }
    }

    /// Attach a reporter that is told about every corruption
    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Read the next logical record.
    ///
    /// Returns `Ok(None)` at the end of the log. Corrupted spans are reported
    /// and skipped; only I/O failures of the source come back as errors.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        if !self.skipped_to_initial {
            self.skip_to_initial_block()?;
            self.skipped_to_initial = true;
        }

        let mut scratch: Vec<u8> = Vec::new();
        let mut in_fragmented_record = false;
        // Offset of the First fragment of the record being assembled
        let mut prospective_offset = 0u64;

        loop {
            let (tag, start, length, offset) = match self.read_physical_record()? {
                Physical::Record {
                    tag,
                    start,
                    length,
                    offset,
                } => (tag, start, length, offset),
                Physical::Eof => {
                    if in_fragmented_record {
                        // The writer died mid-record; not corruption.
                        debug!(bytes = scratch.len(), "discarding partial record at end of log");
                        self.stats.truncated_tail = true;
                    }
                    return Ok(None);
                }
                Physical::Unwritten => {
                    if in_fragmented_record {
                        debug!(bytes = scratch.len(), "partial record runs into unwritten space");
                        self.stats.truncated_tail = true;
                        in_fragmented_record = false;
                        scratch.clear();
                    }
                    continue;
                }
                Physical::Bad => {
                    if in_fragmented_record {
                        self.report_corruption(scratch.len(), "error in middle of record");
                        in_fragmented_record = false;
                        scratch.clear();
                    }
                    self.resyncing = true;
                    continue;
                }
            };

            let Some(record_type) = RecordType::from_tag(tag) else {
                if self.at_physical_end() {
                    return Ok(self.end_at_unwritten_tail(tag, in_fragmented_record));
                }
                let dropped = length + if in_fragmented_record { scratch.len() } else { 0 };
                self.report_corruption(dropped, &format!("unknown record type {}", tag));
                in_fragmented_record = false;
                scratch.clear();
                self.resyncing = true;
                continue;
            };

            if self.resyncing {
                match record_type {
                    RecordType::Middle => continue,
                    RecordType::Last => {
                        self.resyncing = false;
                        continue;
                    }
                    _ => self.resyncing = false,
                }
            }

            match record_type {
                RecordType::Full => {
                    if in_fragmented_record {
                        self.report_corruption(scratch.len(), "partial record without end (full)");
                    }
                    self.last_record_offset = offset;
                    self.last_record_end = self.consumed_offset();
                    self.stats.records += 1;
                    return Ok(Some(self.backing[start..start + length].to_vec()));
                }
                RecordType::First => {
                    if in_fragmented_record {
                        self.report_corruption(scratch.len(), "partial record without end (first)");
                    }
                    prospective_offset = offset;
                    scratch.clear();
                    scratch.extend_from_slice(&self.backing[start..start + length]);
                    in_fragmented_record = true;
                }
                RecordType::Middle => {
                    if in_fragmented_record {
                        scratch.extend_from_slice(&self.backing[start..start + length]);
                    } else {
                        self.report_corruption(length, "missing start of fragmented record (middle)");
                        self.resyncing = true;
                    }
                }
                RecordType::Last => {
                    if in_fragmented_record {
                        scratch.extend_from_slice(&self.backing[start..start + length]);
                        self.last_record_offset = prospective_offset;
                        self.last_record_end = self.consumed_offset();
                        self.stats.records += 1;
                        return Ok(Some(scratch));
                    }
                    self.report_corruption(length, "missing start of fragmented record (last)");
                    self.resyncing = true;
                }
                RecordType::Zero => {
                    if self.at_physical_end() {
                        return Ok(self.end_at_unwritten_tail(tag, in_fragmented_record));
                    }
                    let dropped = length + if in_fragmented_record { scratch.len() } else { 0 };
                    self.report_corruption(dropped, "unexpected zero-type record");
                    in_fragmented_record = false;
                    scratch.clear();
                    self.resyncing = true;
                }
            }
        }
    }

    /// Iterate over the remaining logical records
    pub fn records(&mut self) -> Records<'_, F> {
        Records {
            reader: self,
            done: false,
        }
    }

    /// Physical offset of the last record returned by `read_record`
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    /// Offset just past the last record returned by `read_record`.
    ///
    /// Everything after it holds no intact record.
    pub fn last_record_end(&self) -> u64 {
        self.last_record_end
    }

    /// Counters gathered so far
    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub fn into_inner(self) -> F {
        self.file
    }

    /// Position the source at the block holding `initial_offset`
    fn skip_to_initial_block(&mut self) -> Result<()> {
        let offset_in_block = (self.initial_offset % BLOCK_SIZE as u64) as usize;
        let mut block_start = self.initial_offset - offset_in_block as u64;

        // Within the trailer of a block no record can start
        if offset_in_block > BLOCK_SIZE - (HEADER_SIZE - 1) {
            block_start += BLOCK_SIZE as u64;
        }

        self.end_of_buffer_offset = block_start;
        if block_start > 0 {
            debug!(block_start, initial_offset = self.initial_offset, "skipping to initial block");
            self.file.skip(block_start)?;
        }
        Ok(())
    }

    fn read_physical_record(&mut self) -> Result<Physical> {
        loop {
            let buffered = self.buf_end - self.buf_start;

            if buffered < HEADER_SIZE {
                if !self.eof {
                    // The last read was a full block, so what remains is padding
                    self.clear_buffer();
                    let n = self.file.read(&mut self.backing)?;
                    self.end_of_buffer_offset += n as u64;
                    self.buf_end = n;
                    if n < BLOCK_SIZE {
                        self.eof = true;
                    }
                    continue;
                }

                // A header cut short at the very end is a torn write; an
                // empty buffer is a clean end of log.
                if buffered > 0 {
                    self.stats.truncated_tail = true;
                }
                self.clear_buffer();
                return Ok(Physical::Eof);
            }

            let header = &self.backing[self.buf_start..self.buf_start + HEADER_SIZE];
            let (masked_crc, length, tag) = decode_header(header);

            if HEADER_SIZE + length > buffered {
                let dropped = buffered;
                // The buffer starts on a block boundary. A length running past
                // the block was never produced by a writer, torn or not.
                let overruns_block = self.buf_start + HEADER_SIZE + length > BLOCK_SIZE;
                self.clear_buffer();
                if !self.eof || overruns_block {
                    self.report_corruption(dropped, "bad record length");
                    return Ok(Physical::Bad);
                }
                // Payload cut short at the end of the source: the writer died
                // before finishing the record.
                self.stats.truncated_tail = true;
                return Ok(Physical::Eof);
            }

            if tag == RecordType::Zero.tag() && length == 0 {
                self.clear_buffer();
                return Ok(Physical::Unwritten);
            }

            if self.verify_checksums {
                let expected = unmask_checksum(masked_crc);
                // The checksum covers the type byte followed by the payload
                let covered = &self.backing
                    [self.buf_start + HEADER_SIZE - 1..self.buf_start + HEADER_SIZE + length];
                let actual = crc32c::crc32c(covered);
                if actual != expected {
                    // The length field may itself be damaged, so nothing else
                    // in this block can be trusted.
                    let dropped = buffered;
                    self.clear_buffer();
                    self.report_corruption(dropped, "checksum mismatch");
                    return Ok(Physical::Bad);
                }
            }

            let start = self.buf_start + HEADER_SIZE;
            self.buf_start += HEADER_SIZE + length;

            let remaining = (self.buf_end - self.buf_start) as u64;
            let offset = self.end_of_buffer_offset - remaining - (HEADER_SIZE + length) as u64;
            if offset < self.initial_offset {
                return Ok(Physical::Bad);
            }

            return Ok(Physical::Record {
                tag,
                start,
                length,
                offset,
            });
        }
    }

    /// The last physical record returned was the final one in the source
    fn at_physical_end(&self) -> bool {
        self.eof && self.buf_start == self.buf_end
    }

    /// A Zero or unknown tag in the final physical record is space that was
    /// allocated but never written, so the log ends there.
    fn end_at_unwritten_tail(&mut self, tag: u8, in_fragmented_record: bool) -> Option<Vec<u8>> {
        debug!(tag, "log ends in an unwritten record");
        if in_fragmented_record {
            self.stats.truncated_tail = true;
        }
        None
    }

    /// Source offset of the first unread buffered byte
    fn consumed_offset(&self) -> u64 {
        self.end_of_buffer_offset - (self.buf_end - self.buf_start) as u64
    }

    fn clear_buffer(&mut self) {
        self.buf_start = 0;
        self.buf_end = 0;
    }

    fn report_corruption(&mut self, bytes: usize, reason: &str) {
        let buffered = (self.buf_end - self.buf_start) as u64;
        let drop_start = self
            .end_of_buffer_offset
            .saturating_sub(buffered)
            .saturating_sub(bytes as u64);

        // Damage before the requested start offset is none of our business
        if drop_start < self.initial_offset {
            return;
        }

        warn!(bytes, offset = drop_start, reason, "dropping corrupted log bytes");
        self.stats.corruptions += 1;
        self.stats.bytes_dropped += bytes as u64;

        if let Some(reporter) = self.reporter.as_mut() {
            reporter.corruption(bytes, &WalError::Corruption(reason.to_string()));
        }
    }
}

/// Iterator over logical records, see [`LogReader::records`]
pub struct Records<'a, F: SequentialFile> {
    reader: &'a mut LogReader<F>,
    done: bool,
}

impl<F: SequentialFile> Iterator for Records<'_, F> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
