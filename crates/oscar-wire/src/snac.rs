//! SNAC headers, the addressing layer inside FLAP data frames.

use bytes::{BufMut, BytesMut};

use crate::cursor::Cursor;
use crate::error::Result;

/// Header: family (2) + subtype (2) + flags (2) + request id (4) = 10 bytes.
pub const SNAC_HEADER_LEN: usize = 10;

/// Body starts with a u16-length-prefixed versioning TLV block that dispatch
/// must skip before the real payload.
pub const FLAG_VERSION_BLOCK: u16 = 0x8000;

/// A related SNAC follows this one. Informational only.
pub const FLAG_MORE_FOLLOWING: u16 = 0x0001;

/// The header carried by every SNAC message, all fields big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnacHeader {
    pub family: u16,
    pub subtype: u16,
    pub flags: u16,
    pub request_id: u32,
}

impl SnacHeader {
    /// Creates a header.
    pub fn new(family: u16, subtype: u16, flags: u16, request_id: u32) -> Self {
        Self {
            family,
            subtype,
            flags,
            request_id,
        }
    }

    /// The `(family, subtype)` pair handlers are keyed by.
    pub fn key(&self) -> (u16, u16) {
        (self.family, self.subtype)
    }

    /// Appends the encoded header to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(SNAC_HEADER_LEN);
        dst.put_u16(self.family);
        dst.put_u16(self.subtype);
        dst.put_u16(self.flags);
        dst.put_u32(self.request_id);
    }

    /// Reads a header from the cursor.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<SnacHeader> {
        Ok(SnacHeader {
            family: cur.read_u16()?,
            subtype: cur.read_u16()?,
            flags: cur.read_u16()?,
            request_id: cur.read_u32()?,
        })
    }
}

/// Returns the real body of a SNAC, skipping the leading versioning TLV
/// block when [`FLAG_VERSION_BLOCK`] is set.
pub fn strip_version_block<'a>(header: &SnacHeader, body: &'a [u8]) -> Result<&'a [u8]> {
    if header.flags & FLAG_VERSION_BLOCK == 0 {
        return Ok(body);
    }
    let mut cur = Cursor::new(body);
    let block_len = cur.read_u16()? as usize;
    cur.skip(block_len)?;
    Ok(cur.rest())
}
