//! Server-stored items and their wire form.

use bytes::{BufMut, Bytes, BytesMut};
use oscar_wire::{Chain, Cursor};

use crate::error::{Result, SsiError};

/// Group-membership attribute: the sorted 16-bit ids of a group's members.
pub const ATTR_GROUP_MEMBERS: u16 = 0x00c8;
/// Flag attribute on a buddy added pending the contact's authorization.
pub const ATTR_AWAITING_AUTH: u16 = 0x0066;
/// Privacy-mode attribute on the permit/deny item (one byte).
pub const ATTR_PRIVACY_MODE: u16 = 0x00ca;
/// Class-mask attribute on the permit/deny item (four bytes).
pub const ATTR_PRIVACY_CLASSES: u16 = 0x00cb;

/// What a stored item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A buddy inside a group.
    Buddy,
    /// A group of buddies; the master group has id 0 and no name.
    Group,
    /// A screen name on the permit list.
    Permit,
    /// A screen name on the deny list.
    Deny,
    /// The permit/deny preference item.
    PdInfo,
    /// Client presence preferences.
    PresencePrefs,
    /// A server-defined kind this client does not interpret.
    Other(u16),
}

impl ItemKind {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0000 => ItemKind::Buddy,
            0x0001 => ItemKind::Group,
            0x0002 => ItemKind::Permit,
            0x0003 => ItemKind::Deny,
            0x0004 => ItemKind::PdInfo,
            0x0005 => ItemKind::PresencePrefs,
            other => ItemKind::Other(other),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            ItemKind::Buddy => 0x0000,
            ItemKind::Group => 0x0001,
            ItemKind::Permit => 0x0002,
            ItemKind::Deny => 0x0003,
            ItemKind::PdInfo => 0x0004,
            ItemKind::PresencePrefs => 0x0005,
            ItemKind::Other(v) => v,
        }
    }
}

/// Privacy setting stored in [`ATTR_PRIVACY_MODE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyMode {
    /// Everyone may make contact.
    PermitAll,
    /// Nobody may make contact.
    DenyAll,
    /// Only screen names on the permit list may make contact.
    PermitSome,
    /// Everyone except screen names on the deny list may make contact.
    DenySome,
    /// Only buddies on the buddy list may make contact.
    PermitOnList,
}

impl PrivacyMode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(PrivacyMode::PermitAll),
            0x02 => Some(PrivacyMode::DenyAll),
            0x03 => Some(PrivacyMode::PermitSome),
            0x04 => Some(PrivacyMode::DenySome),
            0x05 => Some(PrivacyMode::PermitOnList),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            PrivacyMode::PermitAll => 0x01,
            PrivacyMode::DenyAll => 0x02,
            PrivacyMode::PermitSome => 0x03,
            PrivacyMode::DenySome => 0x04,
            PrivacyMode::PermitOnList => 0x05,
        }
    }
}

/// One server-stored item.
///
/// Items are addressed by `(group_id, item_id, kind)`. Buddies carry their
/// parent group's `group_id`; permit/deny/preference items sit outside any
/// group with `group_id == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsiItem {
    pub name: Option<String>,
    pub group_id: u16,
    pub item_id: u16,
    pub kind: ItemKind,
    pub attrs: Chain,
}

impl SsiItem {
    /// Creates an item with an empty attribute chain.
    pub fn new(name: Option<String>, group_id: u16, item_id: u16, kind: ItemKind) -> Self {
        Self {
            name,
            group_id,
            item_id,
            kind,
            attrs: Chain::new(),
        }
    }

    /// Key addressing this item in the local mirror.
    pub fn key(&self) -> (u16, u16, ItemKind) {
        (self.group_id, self.item_id, self.kind)
    }

    /// Bytes the item occupies on the wire.
    pub fn wire_len(&self) -> usize {
        2 + self.name.as_deref().map_or(0, str::len) + 8 + self.attrs.encoded_len()
    }

    /// Appends the encoded item to `dst`.
    ///
    /// Layout, all big-endian: name length + name bytes, group id, item id,
    /// kind, attribute-chain length + encoded chain. A nameless item encodes
    /// a zero name length.
    ///
    /// Fails when the name or the attribute chain does not fit its u16
    /// length prefix; nothing is appended in that case.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let name = self.name.as_deref().unwrap_or("");
        if name.len() > usize::from(u16::MAX) {
            return Err(SsiError::FieldTooLong {
                what: "item name",
                len: name.len(),
                max: usize::from(u16::MAX),
            });
        }
        let data_len = self.attrs.encoded_len();
        if data_len > usize::from(u16::MAX) {
            return Err(SsiError::FieldTooLong {
                what: "item attributes",
                len: data_len,
                max: usize::from(u16::MAX),
            });
        }
        dst.reserve(self.wire_len());
        dst.put_u16(name.len() as u16);
        dst.put_slice(name.as_bytes());
        dst.put_u16(self.group_id);
        dst.put_u16(self.item_id);
        dst.put_u16(self.kind.as_u16());
        dst.put_u16(data_len as u16);
        self.attrs.encode_into(dst)?;
        Ok(())
    }

    /// Encodes the item into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes one item, advancing the cursor past it.
    ///
    /// A name that is not valid UTF-8 fails the decode as
    /// [`SsiError::NameNotUtf8`]; the bytes are never rewritten with
    /// replacement characters.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let name_len = cur.read_u16()? as usize;
        let name = if name_len > 0 {
            match std::str::from_utf8(cur.read_slice(name_len)?) {
                Ok(name) => Some(name.to_owned()),
                Err(_) => return Err(SsiError::NameNotUtf8),
            }
        } else {
            None
        };
        let group_id = cur.read_u16()?;
        let item_id = cur.read_u16()?;
        let kind = ItemKind::from_u16(cur.read_u16()?);
        let data_len = cur.read_u16()? as usize;
        let attrs = Chain::decode(cur.read_slice(data_len)?)?;
        Ok(Self {
            name,
            group_id,
            item_id,
            kind,
            attrs,
        })
    }

    /// `true` when this buddy was added pending the contact's authorization.
    pub fn awaiting_auth(&self) -> bool {
        self.attrs.contains(ATTR_AWAITING_AUTH)
    }
}
