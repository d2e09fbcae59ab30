//! Integer and slice encodings used by write batches.
//!
//! Fixed-width integers are little-endian. Lengths are varint32 (LEB128,
//! at most 5 bytes).

use bytes::{Buf, BufMut};

/// Longest valid varint32 encoding
pub const MAX_VARINT32_LEN: usize = 5;

/// Append `value` as a varint32
pub fn put_varint32(buf: &mut impl BufMut, mut value: u32) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decode a varint32 from the front of `input`, advancing it.
///
/// Returns `None` if the input ends early or the encoding is too long.
pub fn get_varint32(input: &mut &[u8]) -> Option<u32> {
    let mut result = 0u32;
    for i in 0..MAX_VARINT32_LEN {
        if !input.has_remaining() {
            return None;
        }
        let byte = input.get_u8();
        let bits = (byte & 0x7F) as u32;
        if i == MAX_VARINT32_LEN - 1 && bits > 0x0F {
            return None;
        }
        result |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Some(result);
        }
    }
    None
}

/// Append `data` prefixed with its varint32 length
pub fn put_length_prefixed_slice(buf: &mut impl BufMut, data: &[u8]) {
    put_varint32(buf, data.len() as u32);
    buf.put_slice(data);
}

/// Split a length-prefixed slice off the front of `input`.
///
/// Returns `None` if the prefix is malformed or would read past the end.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Option<&'a [u8]> {
    let len = get_varint32(input)? as usize;
    if input.len() < len {
        return None;
    }
    let (slice, rest) = input.split_at(len);
    *input = rest;
    Some(slice)
}

/// Number of bytes `put_varint32` writes for `value`
pub fn varint32_len(mut value: u32) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

pub fn decode_fixed32(data: &[u8]) -> u32 {
    (&data[..4]).get_u32_le()
}

pub fn decode_fixed64(data: &[u8]) -> u64 {
    (&data[..8]).get_u64_le()
}

pub fn encode_fixed32(dst: &mut [u8], value: u32) {
    dst[..4].copy_from_slice(&value.to_le_bytes());
}

pub fn encode_fixed64(dst: &mut [u8], value: u64) {
    dst[..8].copy_from_slice(&value.to_le_bytes());
}
