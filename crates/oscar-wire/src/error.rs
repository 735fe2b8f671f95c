/// Errors that can occur while encoding or decoding OSCAR wire structures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A read would run past the end of the input.
    #[error("truncated input ({needed} bytes needed, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// The first byte of a FLAP header is not the 0x2a marker.
    #[error("invalid FLAP marker 0x{found:02x} (expected 0x2a)")]
    InvalidMarker { found: u8 },

    /// A declared payload length exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An attribute value is too long for its u16 length field.
    #[error("attribute value of {len} bytes overflows the u16 length field")]
    ValueTooLong { len: usize },

    /// A nested TLV chain is deeper than the decoder allows.
    #[error("TLV chains nested deeper than {max} levels")]
    NestingTooDeep { max: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;
