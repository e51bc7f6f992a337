//! Schema-less protobuf wire format helpers.
//!
//! Used to bound candidate descriptors before the authoritative decode.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as a tag followed by a value. The low
//! three bits of the tag select the wire type:
//! - 0: VARINT
//! - 1: I64 (8 bytes)
//! - 2: LEN (varint length, then that many bytes)
//! - 3/4: start/end group markers (deprecated, no payload)
//! - 5: I32 (4 bytes)
//!
//! Note that [`decode_varint`] concatenates 7-bit groups in read order, with
//! the first byte most significant. This is not the canonical protobuf
//! order for multi-byte values. Sizes it produces are only estimates; the
//! real length of a descriptor is found by trial decoding.

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl WireType {
    /// Extracts the wire type from a tag byte, `None` for 6 and 7
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag & 0x07 {
            0 => Some(WireType::Varint),
            1 => Some(WireType::I64),
            2 => Some(WireType::Len),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::I32),
            _ => None,
        }
    }
}

/// Tag of field 1 with wire type LEN: `(1 << 3) | 2`
pub const NAME_FIELD_TAG: u8 = 0x0A;

/// Decode a varint starting at `offset`.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;

    for (i, &byte) in data.iter().enumerate().skip(offset) {
        if value > u64::MAX >> 7 {
            return Err(Error::VarintOverflow { offset: i });
        }
        value = (value << 7) | u64::from(byte & 0x7F);

        if byte & 0x80 == 0 {
            return Ok((value, i + 1 - offset));
        }
    }

    Err(Error::truncated(data.len()))
}

/// Estimate the size of the protobuf structure at the start of `data`.
///
/// Walks tag/value pairs and returns the offset reached minus one. An
/// unknown wire type stops the walk at its tag. A value that runs past the
/// end of `data` (or a varint that cannot be read) moves the offset to the
/// end of `data`, so the estimate never falls short of a real descriptor
/// whose length was misread.
pub fn walk(data: &[u8]) -> usize {
    let mut offset = 0;

    while offset < data.len() {
        let Some(wire_type) = WireType::from_tag(data[offset]) else {
            break;
        };
        offset += 1;

        let value_len = match wire_type {
            WireType::Varint => match decode_varint(data, offset) {
                Ok((_, consumed)) => Some(consumed),
                Err(_) => None,
            },
            WireType::I64 => Some(8),
            WireType::Len => match decode_varint(data, offset) {
                Ok((length, consumed)) => usize::try_from(length)
                    .ok()
                    .and_then(|length| length.checked_add(consumed)),
                Err(_) => None,
            },
            WireType::StartGroup | WireType::EndGroup => Some(0),
            WireType::I32 => Some(4),
        };

        match value_len.and_then(|len| offset.checked_add(len)) {
            Some(next) if next <= data.len() => offset = next,
            _ => {
                offset = data.len();
                break;
            }
        }
    }

    offset.saturating_sub(1)
}
