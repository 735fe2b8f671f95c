//! Wire-level codecs for the OSCAR (AIM/ICQ) protocol.
//!
//! Three layers, innermost first:
//! - [`tlv`]: type-length-value attribute chains, the generic payload
//!   encoding used inside almost every message
//! - [`snac`]: the family/subtype-addressed message header carried in FLAP
//!   data frames
//! - [`flap`]: the outermost length-prefixed frame on the byte stream
//!
//! All decoding is bounds-checked through [`cursor::Cursor`] and fails
//! closed: a structure whose declared lengths run past the input yields
//! [`WireError::Truncated`], never a partial or guessed result.

pub mod cursor;
pub mod error;
pub mod flap;
pub mod snac;
pub mod tlv;

pub use cursor::Cursor;
pub use error::{Result, WireError};
pub use flap::{
    decode_frame, encode_frame, FlapConfig, Frame, DEFAULT_MAX_PAYLOAD, FLAP_HEADER_LEN,
    FLAP_MARKER,
};
pub use snac::{SnacHeader, SNAC_HEADER_LEN};
pub use tlv::{Attribute, Chain};
