//! FLAP framing, the outermost layer of every OSCAR connection.
//!
//! Wire format, all big-endian:
//!
//! ```text
//! ┌────────────┬─────────────┬───────────┬──────────────┬──────────────────┐
//! │ Marker 1B  │ Channel 1B  │ Seq 2B    │ Length 2B    │ Payload          │
//! │ 0x2a       │ 1..=5       │           │              │ (Length bytes)   │
//! └────────────┴─────────────┴───────────┴──────────────┴──────────────────┘
//! ```
//!
//! Sequence numbers belong to the sending side of one connection and
//! increase monotonically; they are assigned by the connection at send time,
//! never by the codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Every FLAP frame starts with this byte.
pub const FLAP_MARKER: u8 = 0x2a;

/// Frame header: marker (1) + channel (1) + seq (2) + length (2) = 6 bytes.
pub const FLAP_HEADER_LEN: usize = 6;

/// Default maximum payload length. Real servers stay well under this.
pub const DEFAULT_MAX_PAYLOAD: usize = 8192;

/// Connection negotiation; carries the FLAP version and, on service
/// connections, the login cookie.
pub const CHANNEL_HELLO: u8 = 1;

/// SNAC traffic.
pub const CHANNEL_DATA: u8 = 2;

/// FLAP-level errors. Rarely seen in the wild.
pub const CHANNEL_ERROR: u8 = 3;

/// Connection close, optionally carrying a TLV chain with the reason.
pub const CHANNEL_CLOSE: u8 = 4;

/// Keepalive; payload is always empty.
pub const CHANNEL_KEEPALIVE: u8 = 5;

/// Returns a human-readable name for a channel number.
pub fn channel_name(channel: u8) -> &'static str {
    match channel {
        CHANNEL_HELLO => "HELLO",
        CHANNEL_DATA => "DATA",
        CHANNEL_ERROR => "ERROR",
        CHANNEL_CLOSE => "CLOSE",
        CHANNEL_KEEPALIVE => "KEEPALIVE",
        _ => "UNKNOWN",
    }
}

/// A complete FLAP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The channel this frame belongs to.
    pub channel: u8,
    /// Per-connection sequence number.
    pub seq: u16,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(channel: u8, seq: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            channel,
            seq,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        FLAP_HEADER_LEN + self.payload.len()
    }
}

/// Encodes a frame into the wire format, appending to `dst`.
pub fn encode_frame(channel: u8, seq: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: u16::MAX as usize,
        });
    }
    dst.reserve(FLAP_HEADER_LEN + payload.len());
    dst.put_u8(FLAP_MARKER);
    dst.put_u8(channel);
    dst.put_u16(seq);
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Decodes one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet;
/// partial bytes stay in `src` for the next read. On success the frame's
/// bytes are consumed from `src`. A wrong marker or an oversize declared
/// length is connection-fatal, so those return an error without consuming
/// anything.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < FLAP_HEADER_LEN {
        return Ok(None); // Need more data
    }

    if src[0] != FLAP_MARKER {
        return Err(WireError::InvalidMarker { found: src[0] });
    }

    let channel = src[1];
    let seq = u16::from_be_bytes([src[2], src[3]]);
    let payload_len = u16::from_be_bytes([src[4], src[5]]) as usize;

    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = FLAP_HEADER_LEN + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(FLAP_HEADER_LEN);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        channel,
        seq,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FlapConfig {
    /// Maximum accepted payload length. Default: 8192 bytes.
    pub max_payload: usize,
}

impl Default for FlapConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}
