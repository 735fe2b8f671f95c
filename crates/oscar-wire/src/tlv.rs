//! TLV attribute chains.
//!
//! Almost every SNAC body in OSCAR is (or contains) a chain of
//! type-length-value attributes: `kind` (u16), `length` (u16), then `length`
//! value bytes. Chains preserve order, and a kind may occur more than once;
//! lookups take a 0-based occurrence index.

use bytes::{BufMut, Bytes, BytesMut};

use crate::cursor::Cursor;
use crate::error::{Result, WireError};

/// Byte size of an attribute header (kind + length).
pub const ATTR_HEADER_LEN: usize = 4;

/// Largest value a single attribute can carry; the length field is a u16.
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// Maximum depth accepted when decoding chains embedded in attribute values.
///
/// Real traffic nests two, occasionally three levels (SSI authorization
/// payloads, rendezvous messages); anything deeper is treated as hostile.
pub const MAX_NESTING: usize = 8;

/// A single type-length-value attribute.
///
/// The wire length is always `value.len()`; it is never stored separately,
/// so the two cannot drift apart. Values longer than [`MAX_VALUE_LEN`] can
/// be built but not encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u16,
    pub value: Bytes,
}

impl Attribute {
    /// Creates an attribute with the given value.
    pub fn new(kind: u16, value: impl Into<Bytes>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Creates a zero-length attribute; presence alone carries the meaning.
    pub fn flag(kind: u16) -> Self {
        Self {
            kind,
            value: Bytes::new(),
        }
    }

    /// Creates an attribute holding a single byte.
    pub fn u8(kind: u16, v: u8) -> Self {
        Self::new(kind, vec![v])
    }

    /// Creates an attribute holding a big-endian `u16`.
    pub fn u16(kind: u16, v: u16) -> Self {
        Self::new(kind, v.to_be_bytes().to_vec())
    }

    /// Creates an attribute holding a big-endian `u32`.
    pub fn u32(kind: u16, v: u32) -> Self {
        Self::new(kind, v.to_be_bytes().to_vec())
    }

    /// First value byte, when the value has at least one.
    pub fn value_u8(&self) -> Option<u8> {
        self.value.first().copied()
    }

    /// First two value bytes as a big-endian `u16`.
    pub fn value_u16(&self) -> Option<u16> {
        let b = self.value.get(0..2)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    /// First four value bytes as a big-endian `u32`.
    pub fn value_u32(&self) -> Option<u32> {
        let b = self.value.get(0..4)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Bytes this attribute occupies on the wire.
    pub fn wire_len(&self) -> usize {
        ATTR_HEADER_LEN + self.value.len()
    }
}

/// An ordered sequence of attributes.
///
/// A decoded chain remembers how deeply nested it is, so walking embedded
/// chains through [`Chain::nested`] stays bounded no matter what the input
/// wraps.
#[derive(Debug, Clone, Default, Eq)]
pub struct Chain {
    attrs: Vec<Attribute>,
    depth: usize,
}

// Depth is decode bookkeeping, not part of a chain's identity.
impl PartialEq for Chain {
    fn eq(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}

impl Chain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute, keeping wire order.
    pub fn push(&mut self, attr: Attribute) {
        self.attrs.push(attr);
    }

    /// Number of attributes in the chain.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns `true` when the chain holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterates the attributes in wire order.
    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.attrs.iter()
    }

    /// Total encoded size of the chain.
    ///
    /// Callers use this to size the enclosing frame or item before encoding.
    pub fn encoded_len(&self) -> usize {
        self.attrs.iter().map(Attribute::wire_len).sum()
    }

    /// Appends the encoded chain to `dst`.
    ///
    /// Fails with [`WireError::ValueTooLong`] when any value exceeds
    /// [`MAX_VALUE_LEN`]; nothing is appended in that case.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        for attr in &self.attrs {
            if attr.value.len() > MAX_VALUE_LEN {
                return Err(WireError::ValueTooLong {
                    len: attr.value.len(),
                });
            }
        }
        dst.reserve(self.encoded_len());
        for attr in &self.attrs {
            dst.put_u16(attr.kind);
            dst.put_u16(attr.value.len() as u16);
            dst.put_slice(&attr.value);
        }
        Ok(())
    }

    /// Encodes the chain into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a chain that must span the whole input.
    ///
    /// Fails with [`WireError::Truncated`] the moment an attribute header or
    /// value would run past the end; trailing partial data is an error, not
    /// silently ignored.
    pub fn decode(input: &[u8]) -> Result<Chain> {
        Self::decode_at_depth(input, 0)
    }

    fn decode_at_depth(input: &[u8], depth: usize) -> Result<Chain> {
        if depth > MAX_NESTING {
            return Err(WireError::NestingTooDeep { max: MAX_NESTING });
        }
        let mut cur = Cursor::new(input);
        let mut attrs = Vec::new();
        while !cur.is_empty() {
            let kind = cur.read_u16()?;
            let len = cur.read_u16()? as usize;
            let value = cur.read_slice(len)?;
            attrs.push(Attribute::new(kind, Bytes::copy_from_slice(value)));
        }
        Ok(Chain { attrs, depth })
    }

    /// Decodes an attribute's value as a chain one level below this one,
    /// failing once [`MAX_NESTING`] levels are exceeded.
    pub fn nested(&self, attr: &Attribute) -> Result<Chain> {
        Self::decode_at_depth(&attr.value, self.depth + 1)
    }

    /// Returns the `occurrence`-th (0-based) attribute of `kind`.
    pub fn find(&self, kind: u16, occurrence: usize) -> Option<&Attribute> {
        self.attrs
            .iter()
            .filter(|a| a.kind == kind)
            .nth(occurrence)
    }

    /// Returns the first attribute of `kind`.
    pub fn first(&self, kind: u16) -> Option<&Attribute> {
        self.find(kind, 0)
    }

    /// Returns `true` if any attribute of `kind` is present.
    pub fn contains(&self, kind: u16) -> bool {
        self.first(kind).is_some()
    }

    /// Replaces the value of the first attribute of `kind`, or appends a new
    /// attribute when none exists.
    pub fn set(&mut self, kind: u16, value: impl Into<Bytes>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.kind == kind) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attribute::new(kind, value)),
        }
    }

    /// Removes every attribute of `kind`.
    pub fn remove_all(&mut self, kind: u16) {
        self.attrs.retain(|a| a.kind != kind);
    }
}

impl FromIterator<Attribute> for Chain {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Chain {
            attrs: iter.into_iter().collect(),
            depth: 0,
        }
    }
}

impl<'a> IntoIterator for &'a Chain {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attrs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encoding() {
        // A flag attribute followed by a two-byte value.
        let chain: Chain = [Attribute::flag(0x0006), Attribute::new(0x000c, &b"hi"[..])]
            .into_iter()
            .collect();

        let encoded = chain.to_bytes().unwrap();
        assert_eq!(
            encoded.as_ref(),
            &[0x00, 0x06, 0x00, 0x00, 0x00, 0x0c, 0x00, 0x02, 0x68, 0x69]
        );

        let decoded = Chain::decode(&encoded).unwrap();
        assert_eq!(decoded, chain);
    }

    #[test]
    fn test_roundtrip_preserves_order_and_duplicates() {
        let chain: Chain = [
            Attribute::new(0x0001, &b"first"[..]),
            Attribute::new(0x0002, &b"mid"[..]),
            Attribute::new(0x0001, &b"second"[..]),
        ]
        .into_iter()
        .collect();

        let decoded = Chain::decode(&chain.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, chain);
        assert_eq!(decoded.find(0x0001, 0).unwrap().value.as_ref(), b"first");
        assert_eq!(decoded.find(0x0001, 1).unwrap().value.as_ref(), b"second");
        assert!(decoded.find(0x0001, 2).is_none());
    }

    #[test]
    fn test_roundtrip_at_max_value_len() {
        // A value of exactly u16::MAX bytes still fits the length field.
        let chain: Chain = [Attribute::new(0x0131, vec![0xab; MAX_VALUE_LEN])]
            .into_iter()
            .collect();

        let encoded = chain.to_bytes().unwrap();
        assert_eq!(encoded.len(), ATTR_HEADER_LEN + MAX_VALUE_LEN);
        assert_eq!(&encoded[2..4], &[0xff, 0xff]);

        let decoded = Chain::decode(&encoded).unwrap();
        assert_eq!(decoded, chain);
    }

    #[test]
    fn test_oversize_value_fails_encode() {
        // One byte past u16::MAX must refuse to encode rather than wrap the
        // length field and desync the stream.
        let chain: Chain = [
            Attribute::u16(0x0001, 7),
            Attribute::new(0x0002, vec![0; MAX_VALUE_LEN + 1]),
        ]
        .into_iter()
        .collect();

        let mut buf = BytesMut::new();
        let err = chain.encode_into(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::ValueTooLong { len } if len == MAX_VALUE_LEN + 1));
        assert!(buf.is_empty());
        assert!(chain.to_bytes().is_err());
    }

    #[test]
    fn test_truncated_header_fails() {
        // Three bytes cannot hold a 4-byte attribute header.
        let err = Chain::decode(&[0x00, 0x06, 0x00]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn test_truncated_value_fails() {
        // Declares 4 value bytes, supplies 2.
        let err = Chain::decode(&[0x00, 0x01, 0x00, 0x04, 0xaa, 0xbb]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn test_every_prefix_of_valid_chain_fails_or_is_shorter() {
        let chain: Chain = [
            Attribute::new(0x0010, vec![1, 2, 3]),
            Attribute::u16(0x0020, 0xbeef),
        ]
        .into_iter()
        .collect();
        let encoded = chain.to_bytes().unwrap();

        for cut in 0..encoded.len() {
            match Chain::decode(&encoded[..cut]) {
                // A prefix may happen to end on an attribute boundary; then
                // it must decode to a strict prefix of the chain.
                Ok(shorter) => assert!(shorter.len() < chain.len()),
                Err(e) => assert!(matches!(e, WireError::Truncated { .. })),
            }
        }
    }

    #[test]
    fn test_nested_chain_decodes() {
        let inner: Chain = [Attribute::u16(0x0101, 0x1234)].into_iter().collect();
        let outer: Chain = [Attribute::new(0x0002, inner.to_bytes().unwrap())]
            .into_iter()
            .collect();

        let decoded = Chain::decode(&outer.to_bytes().unwrap()).unwrap();
        let nested = decoded.nested(decoded.first(0x0002).unwrap()).unwrap();
        assert_eq!(nested, inner);
    }

    #[test]
    fn test_nesting_depth_guard() {
        // Build MAX_NESTING + 1 levels of wrapping and walk back down.
        let mut chain: Chain = [Attribute::flag(0x0000)].into_iter().collect();
        for _ in 0..MAX_NESTING + 1 {
            chain = [Attribute::new(0x0001, chain.to_bytes().unwrap())]
                .into_iter()
                .collect();
        }

        let mut current = Chain::decode(&chain.to_bytes().unwrap()).unwrap();
        let mut depth = 0usize;
        loop {
            let Some(attr) = current.first(0x0001) else {
                panic!("hit the innermost chain before the guard at depth {depth}");
            };
            match current.nested(attr) {
                Ok(inner) => {
                    current = inner;
                    depth += 1;
                }
                Err(e) => {
                    assert!(matches!(e, WireError::NestingTooDeep { .. }));
                    assert_eq!(depth, MAX_NESTING);
                    break;
                }
            }
        }
    }

    #[test]
    fn test_flag_attribute_is_presence_only() {
        let chain: Chain = [Attribute::flag(0x0066)].into_iter().collect();
        let decoded = Chain::decode(&chain.to_bytes().unwrap()).unwrap();
        assert!(decoded.contains(0x0066));
        assert!(decoded.first(0x0066).unwrap().value.is_empty());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut chain: Chain = [
            Attribute::new(0x00c8, vec![0x00, 0x01]),
            Attribute::u8(0x00ca, 4),
        ]
        .into_iter()
        .collect();

        chain.set(0x00c8, vec![0x00, 0x01, 0x00, 0x02]);
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain.first(0x00c8).unwrap().value.as_ref(),
            &[0x00, 0x01, 0x00, 0x02]
        );
        // Position is preserved.
        assert_eq!(chain.iter().next().unwrap().kind, 0x00c8);

        chain.set(0x00cb, vec![0xff; 4]);
        assert_eq!(chain.len(), 3);

        chain.remove_all(0x00c8);
        assert!(!chain.contains(0x00c8));
    }

    #[test]
    fn test_integer_accessors() {
        let attr = Attribute::u32(0x0009, 0x0102_0304);
        assert_eq!(attr.value_u32(), Some(0x0102_0304));
        assert_eq!(attr.value_u16(), Some(0x0102));
        assert_eq!(attr.value_u8(), Some(0x01));
        assert_eq!(Attribute::flag(0x0009).value_u16(), None);
    }
}
