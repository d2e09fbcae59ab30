//! Log format constants
//!
//! Shared knowledge between the writer and the reader: block geometry,
//! the record header layout and the record type tags.

/// Size of one log block. The stream is split into consecutive blocks
/// starting at offset 0 and no physical record crosses a block boundary.
pub const BLOCK_SIZE: usize = 32768;

/// Header size: checksum (4) + length (2) + type (1)
pub const HEADER_SIZE: usize = 4 + 2 + 1;

/// Largest payload a single physical record can declare (2-byte length)
pub const MAX_RECORD_PAYLOAD: usize = u16::MAX as usize;

/// Highest valid record type tag
pub const MAX_RECORD_TYPE: u8 = RecordType::Last as u8;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Type tag stored in the last header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// Reserved for pre-allocated files; never written by the writer
    Zero = 0,

    /// The whole logical record
    Full = 1,

    /// First fragment of a logical record
    First = 2,

    /// Interior fragment
    Middle = 3,

    /// Final fragment
    Last = 4,
}

impl RecordType {
    /// Parse a header tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(RecordType::Zero),
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }

    /// Pick the type of a fragment from its position in the logical record
    pub fn for_fragment(begin: bool, end: bool) -> Self {
        match (begin, end) {
            (true, true) => RecordType::Full,
            (true, false) => RecordType::First,
            (false, true) => RecordType::Last,
            (false, false) => RecordType::Middle,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// CRC32C of each type byte on its own, indexed by tag.
///
/// The stored checksum covers `type ‖ payload`, so a record's checksum is
/// `crc32c_append(table[type], payload)`.
pub fn type_checksum_table() -> [u32; MAX_RECORD_TYPE as usize + 1] {
    let mut table = [0u32; MAX_RECORD_TYPE as usize + 1];
    for (tag, slot) in table.iter_mut().enumerate() {
        *slot = crc32c::crc32c(&[tag as u8]);
    }
    table
}

/// Masked representation of a checksum.
///
/// Computing the CRC of a string that contains embedded CRCs is
/// problematic, so stored checksums are rotated and offset.
pub fn mask_checksum(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask_checksum`]
pub fn unmask_checksum(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// Encode a record header for `payload` of the given type
pub fn encode_header(record_type: RecordType, crc: u32, length: usize) -> [u8; HEADER_SIZE] {
    debug_assert!(length <= MAX_RECORD_PAYLOAD);
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&mask_checksum(crc).to_le_bytes());
    header[4..6].copy_from_slice(&(length as u16).to_le_bytes());
    header[6] = record_type.tag();
    header
}

/// Split a header into (masked checksum, payload length, type tag)
pub fn decode_header(header: &[u8]) -> (u32, usize, u8) {
    let masked = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let length = u16::from_le_bytes([header[4], header[5]]) as usize;
    (masked, length, header[6])
}
