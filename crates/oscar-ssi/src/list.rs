//! The local mirror of the server-stored list.

use std::collections::HashMap;

use oscar_wire::Cursor;

use crate::error::Result;
use crate::item::{ItemKind, SsiItem, ATTR_GROUP_MEMBERS};

/// Space- and case-insensitive screen name comparison.
///
/// AIM treats `"Screen Name"` and `"screenname"` as the same handle: spaces
/// are ignored entirely and ASCII letters compare case-insensitively.
pub fn name_eq(a: &str, b: &str) -> bool {
    let mut left = a.bytes().filter(|c| *c != b' ');
    let mut right = b.bytes().filter(|c| *c != b' ');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x.eq_ignore_ascii_case(&y) => {}
            _ => return false,
        }
    }
}

/// The full local mirror plus the bookkeeping the server hands back with it.
///
/// Items are keyed by `(group_id, item_id, kind)`; if a server payload ever
/// repeats a key, the later item wins.
#[derive(Debug, Default)]
pub struct SsiList {
    items: HashMap<(u16, u16, ItemKind), SsiItem>,
    /// Number of times the server-side data has been modified.
    pub revision: u16,
    /// Server timestamp of the last modification.
    pub timestamp: u32,
    /// True only once a complete initial fetch has landed.
    pub received_data: bool,
}

impl SsiList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates all items in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &SsiItem> {
        self.items.values()
    }

    pub fn get(&self, group_id: u16, item_id: u16, kind: ItemKind) -> Option<&SsiItem> {
        self.items.get(&(group_id, item_id, kind))
    }

    pub(crate) fn get_mut(
        &mut self,
        group_id: u16,
        item_id: u16,
        kind: ItemKind,
    ) -> Option<&mut SsiItem> {
        self.items.get_mut(&(group_id, item_id, kind))
    }

    pub(crate) fn insert(&mut self, item: SsiItem) {
        self.items.insert(item.key(), item);
    }

    pub(crate) fn remove(&mut self, group_id: u16, item_id: u16, kind: ItemKind) -> Option<SsiItem> {
        self.items.remove(&(group_id, item_id, kind))
    }

    /// Drops every item ahead of a fresh full fetch.
    pub(crate) fn clear_items(&mut self) {
        self.items.clear();
        self.received_data = false;
    }

    /// Finds the group item with the given name.
    pub fn find_group(&self, name: &str) -> Option<&SsiItem> {
        self.items.values().find(|i| {
            i.kind == ItemKind::Group && i.name.as_deref().is_some_and(|n| name_eq(n, name))
        })
    }

    /// Finds the group item carrying the given group id.
    pub fn find_group_by_id(&self, group_id: u16) -> Option<&SsiItem> {
        self.items
            .values()
            .find(|i| i.kind == ItemKind::Group && i.group_id == group_id)
    }

    /// Finds the first item of `kind` whose name matches.
    pub fn find_named(&self, kind: ItemKind, name: &str) -> Option<&SsiItem> {
        self.items
            .values()
            .find(|i| i.kind == kind && i.name.as_deref().is_some_and(|n| name_eq(n, name)))
    }

    /// Finds a buddy by name inside the named group.
    pub fn find_buddy_in_group(&self, group_name: &str, name: &str) -> Option<&SsiItem> {
        let group_id = self.find_group(group_name)?.group_id;
        self.items.values().find(|i| {
            i.kind == ItemKind::Buddy
                && i.group_id == group_id
                && i.name.as_deref().is_some_and(|n| name_eq(n, name))
        })
    }

    /// Finds the first item of `kind`, named or not.
    ///
    /// Used for singleton items such as the permit/deny preference.
    pub fn find_first_of_kind(&self, kind: ItemKind) -> Option<&SsiItem> {
        self.items.values().find(|i| i.kind == kind)
    }

    /// Smallest group id not used by any item, starting from 1.
    pub fn next_group_id(&self) -> u16 {
        let mut gid = 1u16;
        while self.items.values().any(|i| i.group_id == gid) {
            gid += 1;
        }
        gid
    }

    /// Smallest item id unused within `group_id`, starting from 1.
    ///
    /// Collisions are checked against items of every kind, not just buddies,
    /// matching how the server allocates.
    pub fn next_item_id(&self, group_id: u16) -> u16 {
        let mut bid = 1u16;
        while self
            .items
            .values()
            .any(|i| i.group_id == group_id && i.item_id == bid)
        {
            bid += 1;
        }
        bid
    }

    /// `true` when no buddy references `group_id`.
    pub fn group_is_empty(&self, group_id: u16) -> bool {
        !self
            .items
            .values()
            .any(|i| i.kind == ItemKind::Buddy && i.group_id == group_id)
    }

    /// Rebuilds the derived membership attribute of a group.
    ///
    /// For the master group (id 0) the members are the ids of every other
    /// group; for any other group they are the item ids of the buddies it
    /// holds. The sorted ids replace the previous [`ATTR_GROUP_MEMBERS`]
    /// value in place; other attributes on the group are left alone, and an
    /// empty membership removes the attribute entirely. Returns the updated
    /// group item, or `None` when no such group exists in the mirror.
    pub(crate) fn recompute_membership(&mut self, group_id: u16) -> Option<&SsiItem> {
        let mut members: Vec<u16> = if group_id == 0 {
            self.items
                .values()
                .filter(|i| i.kind == ItemKind::Group && i.group_id != 0)
                .map(|i| i.group_id)
                .collect()
        } else {
            self.items
                .values()
                .filter(|i| i.kind == ItemKind::Buddy && i.group_id == group_id)
                .map(|i| i.item_id)
                .collect()
        };
        members.sort_unstable();

        let key = self.find_group_by_id(group_id).map(SsiItem::key)?;
        let group = self.items.get_mut(&key)?;
        if members.is_empty() {
            group.attrs.remove_all(ATTR_GROUP_MEMBERS);
        } else {
            let mut value = Vec::with_capacity(members.len() * 2);
            for id in &members {
                value.extend_from_slice(&id.to_be_bytes());
            }
            group.attrs.set(ATTR_GROUP_MEMBERS, value);
        }
        self.items.get(&key)
    }

    /// Ingests one full-fetch payload, appending its items to the mirror.
    ///
    /// Layout: format version (u8), revision (u16), items until exactly four
    /// bytes remain, then a u32 timestamp. Long lists arrive split across
    /// several payloads, so items are appended, not replaced. A malformed
    /// item fails the whole payload and leaves the mirror untouched.
    pub(crate) fn ingest_full_list(&mut self, body: &[u8]) -> Result<()> {
        let mut cur = Cursor::new(body);
        let _format_version = cur.read_u8()?;
        let revision = cur.read_u16()?;

        let mut incoming = Vec::new();
        while cur.remaining() > 4 {
            incoming.push(SsiItem::decode(&mut cur)?);
        }
        let timestamp = cur.read_u32()?;

        for item in incoming {
            self.items.insert(item.key(), item);
        }
        if revision != 0 {
            self.revision = revision;
        }
        if timestamp != 0 {
            self.timestamp = timestamp;
        }
        Ok(())
    }
}
