//! The SSI engine: local mirror plus the serialized mutation protocol.
//!
//! The engine owns the mirror and the holding queue but never touches a
//! socket. Prepared SNAC bodies accumulate in an outbox for the connection
//! layer to header, frame and send; inbound SSI bodies are fed back in
//! through the `handle_*` methods, and anything a caller should react to
//! comes out as an [`SsiEvent`].

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use oscar_wire::{Attribute, Chain, Cursor};

use crate::error::{Result, SsiError};
use crate::item::{
    ItemKind, PrivacyMode, SsiItem, ATTR_AWAITING_AUTH, ATTR_PRIVACY_CLASSES, ATTR_PRIVACY_MODE,
};
use crate::list::SsiList;
use crate::mutation::{Mutation, MutationQueue};

/// SNAC family carrying all server-stored-information traffic.
pub const FAMILY_SSI: u16 = 0x0013;

/// Subtypes within [`FAMILY_SSI`].
pub const SSI_REQUEST_RIGHTS: u16 = 0x0002;
pub const SSI_RIGHTS: u16 = 0x0003;
pub const SSI_REQUEST_LIST: u16 = 0x0004;
pub const SSI_LIST: u16 = 0x0006;
pub const SSI_ACTIVATE: u16 = 0x0007;
pub const SSI_ADD: u16 = 0x0008;
pub const SSI_MODIFY: u16 = 0x0009;
pub const SSI_DELETE: u16 = 0x000a;
pub const SSI_ACK: u16 = 0x000e;
pub const SSI_LIST_UNCHANGED: u16 = 0x000f;
pub const SSI_EDIT_START: u16 = 0x0011;
pub const SSI_EDIT_STOP: u16 = 0x0012;
pub const SSI_AUTH_REQUEST: u16 = 0x0018;
pub const SSI_AUTH_REQUESTED: u16 = 0x0019;
pub const SSI_AUTH_REPLY: u16 = 0x001a;
pub const SSI_AUTH_REPLIED: u16 = 0x001b;

/// Ack status: the mutation was applied.
pub const ACK_OK: u16 = 0x0000;
/// Ack status: the contact must authorize being added first.
pub const ACK_AUTH_REQUIRED: u16 = 0x000e;

/// Rights attribute holding the per-kind maximum item counts.
const RIGHTS_MAXIMA: u16 = 0x0004;

/// How an outbound SNAC prepared by the engine must be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    /// A queued mutation; report the assigned request id back through
    /// [`SsiEngine::mutation_sent`] so its ack can be recognized.
    Mutation,
    /// Expects a correlated reply; worth a pending-request entry.
    Query,
    /// Fire-and-forget control traffic.
    Control,
}

/// An SSI SNAC body ready for the connection layer to header and frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSnac {
    pub subtype: u16,
    pub body: Bytes,
    pub kind: OutboundKind,
}

/// Things that happen inside the engine a caller will want to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsiEvent {
    /// The mirror is populated (or confirmed current) and ready for use.
    ListReady { revision: u16, timestamp: u32 },
    /// Per-kind maximum item counts the server enforces.
    Rights { maxima: Vec<u16> },
    /// A mutation was acknowledged; one status code per item sent.
    Acked {
        subtype: u16,
        names: Vec<String>,
        statuses: Vec<u16>,
    },
    /// Another user wants to add this account and asks for authorization.
    AuthRequested { from: String, reason: String },
    /// A contact answered an earlier authorization request.
    AuthReplied {
        from: String,
        granted: bool,
        reason: String,
    },
}

/// Drives the server-stored list: optimistic local mutation, strictly
/// serialized wire mutations, and the authorization side protocol.
#[derive(Debug, Default)]
pub struct SsiEngine {
    list: SsiList,
    queue: MutationQueue,
    rights: Vec<u16>,
    outbox: VecDeque<OutboundSnac>,
    events: VecDeque<SsiEvent>,
}

impl SsiEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the local mirror. All writes go through the engine.
    pub fn list(&self) -> &SsiList {
        &self.list
    }

    /// Per-kind item maxima from the rights reply; empty until one arrives.
    /// Stored for callers to consult, not enforced on mutations.
    pub fn rights(&self) -> &[u16] {
        &self.rights
    }

    /// Next prepared SNAC body, in send order.
    pub fn next_outbound(&mut self) -> Option<OutboundSnac> {
        self.outbox.pop_front()
    }

    /// Next event for the caller.
    pub fn next_event(&mut self) -> Option<SsiEvent> {
        self.events.pop_front()
    }

    /// `true` while a mutation is on the wire awaiting its ack.
    pub fn waiting_for_ack(&self) -> bool {
        self.queue.waiting_for_ack()
    }

    /// Mutations queued behind the in-flight one.
    pub fn queued_mutations(&self) -> usize {
        self.queue.len()
    }

    fn push_control(&mut self, subtype: u16) {
        self.outbox.push_back(OutboundSnac {
            subtype,
            body: Bytes::new(),
            kind: OutboundKind::Control,
        });
    }

    fn push_query(&mut self, subtype: u16) {
        self.outbox.push_back(OutboundSnac {
            subtype,
            body: Bytes::new(),
            kind: OutboundKind::Query,
        });
    }

    /// Queues one item mutation, opening the edit window when needed.
    ///
    /// An item that cannot be encoded fails the call with nothing queued.
    fn enqueue_mutation(&mut self, subtype: u16, item: &SsiItem) -> Result<()> {
        let mutation = Mutation {
            subtype,
            names: item.name.iter().cloned().collect(),
            body: item.to_bytes()?,
        };
        if self.queue.push(mutation) {
            self.push_control(SSI_EDIT_START);
        }
        Ok(())
    }

    /// Puts the next queued mutation on the wire when none is in flight,
    /// or closes the edit window once the queue has drained.
    fn pump_queue(&mut self) {
        if let Some(mutation) = self.queue.start_next() {
            let out = OutboundSnac {
                subtype: mutation.subtype,
                body: mutation.body.clone(),
                kind: OutboundKind::Mutation,
            };
            self.outbox.push_back(out);
        } else if self.queue.close_if_drained() {
            self.push_control(SSI_EDIT_STOP);
        }
    }

    // ---- buddy and group operations ----

    /// Adds a buddy, creating its group first when it does not exist yet.
    ///
    /// The mirror reflects the buddy immediately; the queued mutations reach
    /// the server one ack at a time. A server rejection is surfaced as an
    /// [`SsiEvent::Acked`] with a non-zero status, and reconciling the
    /// mirror after one is the caller's decision, not automatic.
    ///
    /// Fails only when an item cannot be encoded; nothing is queued or
    /// mirrored then.
    pub fn add_buddy(&mut self, group_name: &str, handle: &str) -> Result<()> {
        self.add_buddy_inner(group_name, handle, false)
    }

    /// Adds a buddy carrying the awaiting-authorization flag, for contacts
    /// whose ack to a plain add came back [`ACK_AUTH_REQUIRED`].
    pub fn add_buddy_awaiting_auth(&mut self, group_name: &str, handle: &str) -> Result<()> {
        self.add_buddy_inner(group_name, handle, true)
    }

    fn add_buddy_inner(
        &mut self,
        group_name: &str,
        handle: &str,
        awaiting_auth: bool,
    ) -> Result<()> {
        if self.list.find_buddy_in_group(group_name, handle).is_some() {
            debug!(group = group_name, handle, "buddy already present");
            return Ok(());
        }
        let group_id = match self.list.find_group(group_name) {
            Some(group) => group.group_id,
            None => self.create_group(group_name)?,
        };
        let item_id = self.list.next_item_id(group_id);
        let mut item = SsiItem::new(Some(handle.to_string()), group_id, item_id, ItemKind::Buddy);
        if awaiting_auth {
            item.attrs.push(Attribute::flag(ATTR_AWAITING_AUTH));
        }
        self.enqueue_mutation(SSI_ADD, &item)?;
        self.list.insert(item);
        self.modify_group(group_id)?;
        self.pump_queue();
        Ok(())
    }

    /// Removes a buddy; an emptied group is deleted behind it.
    pub fn remove_buddy(&mut self, group_name: &str, handle: &str) -> Result<()> {
        let group_id = self
            .list
            .find_group(group_name)
            .ok_or_else(|| SsiError::GroupNotFound {
                name: group_name.to_string(),
            })?
            .group_id;
        let (gid, bid, kind) = self
            .list
            .find_buddy_in_group(group_name, handle)
            .map(SsiItem::key)
            .ok_or_else(|| SsiError::BuddyNotFound {
                group: group_name.to_string(),
                name: handle.to_string(),
            })?;
        let item = self
            .list
            .remove(gid, bid, kind)
            .ok_or_else(|| SsiError::BuddyNotFound {
                group: group_name.to_string(),
                name: handle.to_string(),
            })?;

        self.enqueue_mutation(SSI_DELETE, &item)?;
        self.modify_group(group_id)?;
        // An emptied group goes with its last buddy; the master group never.
        if group_id != 0 && self.list.group_is_empty(group_id) {
            self.delete_group(group_id)?;
        }
        self.pump_queue();
        Ok(())
    }

    /// Moves a buddy between groups.
    ///
    /// The protocol has no move; this is a delete and a re-add under a
    /// freshly allocated item id, then a membership update for each group.
    pub fn move_buddy(&mut self, old_group: &str, new_group: &str, handle: &str) -> Result<()> {
        let old_id = self
            .list
            .find_group(old_group)
            .ok_or_else(|| SsiError::GroupNotFound {
                name: old_group.to_string(),
            })?
            .group_id;
        let new_id = self
            .list
            .find_group(new_group)
            .ok_or_else(|| SsiError::GroupNotFound {
                name: new_group.to_string(),
            })?
            .group_id;
        let (gid, bid, kind) = self
            .list
            .find_buddy_in_group(old_group, handle)
            .map(SsiItem::key)
            .ok_or_else(|| SsiError::BuddyNotFound {
                group: old_group.to_string(),
                name: handle.to_string(),
            })?;
        let mut item = self
            .list
            .remove(gid, bid, kind)
            .ok_or_else(|| SsiError::BuddyNotFound {
                group: old_group.to_string(),
                name: handle.to_string(),
            })?;

        self.enqueue_mutation(SSI_DELETE, &item)?;

        item.group_id = new_id;
        item.item_id = self.list.next_item_id(new_id);
        self.enqueue_mutation(SSI_ADD, &item)?;
        self.list.insert(item);

        self.modify_group(old_id)?;
        self.modify_group(new_id)?;
        self.pump_queue();
        Ok(())
    }

    /// Creates a group locally and queues its add; returns the new id.
    fn create_group(&mut self, name: &str) -> Result<u16> {
        let group_id = self.list.next_group_id();
        let item = SsiItem::new(Some(name.to_string()), group_id, 0, ItemKind::Group);
        self.enqueue_mutation(SSI_ADD, &item)?;
        self.list.insert(item);
        // The master group's membership is derived; keep it coherent.
        self.list.recompute_membership(0);
        Ok(group_id)
    }

    /// Recomputes a group's membership and queues its modify.
    fn modify_group(&mut self, group_id: u16) -> Result<()> {
        if let Some(group) = self.list.recompute_membership(group_id).cloned() {
            self.enqueue_mutation(SSI_MODIFY, &group)?;
        }
        Ok(())
    }

    /// Deletes an emptied group and fixes the master bookkeeping.
    fn delete_group(&mut self, group_id: u16) -> Result<()> {
        let Some((gid, bid, kind)) = self.list.find_group_by_id(group_id).map(SsiItem::key) else {
            return Ok(());
        };
        let Some(item) = self.list.remove(gid, bid, kind) else {
            return Ok(());
        };
        self.enqueue_mutation(SSI_DELETE, &item)?;
        self.list.recompute_membership(0);
        Ok(())
    }

    // ---- permit / deny / privacy ----

    /// Puts a screen name on the permit list.
    pub fn add_permit(&mut self, handle: &str) -> Result<()> {
        self.add_listed(handle, ItemKind::Permit)
    }

    /// Puts a screen name on the deny list.
    pub fn add_deny(&mut self, handle: &str) -> Result<()> {
        self.add_listed(handle, ItemKind::Deny)
    }

    fn add_listed(&mut self, handle: &str, kind: ItemKind) -> Result<()> {
        if self.list.find_named(kind, handle).is_some() {
            debug!(handle, ?kind, "already listed");
            return Ok(());
        }
        let item_id = self.list.next_item_id(0);
        let item = SsiItem::new(Some(handle.to_string()), 0, item_id, kind);
        self.enqueue_mutation(SSI_ADD, &item)?;
        self.list.insert(item);
        self.pump_queue();
        Ok(())
    }

    pub fn remove_permit(&mut self, handle: &str) -> Result<()> {
        self.remove_listed(handle, ItemKind::Permit)
    }

    pub fn remove_deny(&mut self, handle: &str) -> Result<()> {
        self.remove_listed(handle, ItemKind::Deny)
    }

    fn remove_listed(&mut self, handle: &str, kind: ItemKind) -> Result<()> {
        let (gid, bid, kind) = self
            .list
            .find_named(kind, handle)
            .map(SsiItem::key)
            .ok_or_else(|| SsiError::ItemNotFound {
                kind,
                name: handle.to_string(),
            })?;
        let item = self
            .list
            .remove(gid, bid, kind)
            .ok_or_else(|| SsiError::ItemNotFound {
                kind,
                name: handle.to_string(),
            })?;
        self.enqueue_mutation(SSI_DELETE, &item)?;
        self.pump_queue();
        Ok(())
    }

    /// Stores the privacy mode and visible-class mask, creating the
    /// preference item on first use.
    pub fn set_privacy(&mut self, mode: PrivacyMode, class_mask: u32) -> Result<()> {
        match self
            .list
            .find_first_of_kind(ItemKind::PdInfo)
            .map(SsiItem::key)
        {
            Some((gid, bid, kind)) => {
                let snapshot = match self.list.get_mut(gid, bid, kind) {
                    Some(item) => {
                        item.attrs.set(ATTR_PRIVACY_MODE, vec![mode.as_u8()]);
                        item.attrs
                            .set(ATTR_PRIVACY_CLASSES, class_mask.to_be_bytes().to_vec());
                        item.clone()
                    }
                    None => return Ok(()),
                };
                self.enqueue_mutation(SSI_MODIFY, &snapshot)?;
            }
            None => {
                let item_id = self.list.next_item_id(0);
                let mut item = SsiItem::new(None, 0, item_id, ItemKind::PdInfo);
                item.attrs.push(Attribute::u8(ATTR_PRIVACY_MODE, mode.as_u8()));
                item.attrs
                    .push(Attribute::u32(ATTR_PRIVACY_CLASSES, class_mask));
                self.enqueue_mutation(SSI_ADD, &item)?;
                self.list.insert(item);
            }
        }
        self.pump_queue();
        Ok(())
    }

    /// Current privacy mode, when the preference item exists.
    pub fn privacy_mode(&self) -> Option<PrivacyMode> {
        let item = self.list.find_first_of_kind(ItemKind::PdInfo)?;
        PrivacyMode::from_u8(item.attrs.first(ATTR_PRIVACY_MODE)?.value_u8()?)
    }

    // ---- fetch, rights, activation ----

    /// Asks the server for the per-kind item limits.
    pub fn request_rights(&mut self) {
        self.push_query(SSI_REQUEST_RIGHTS);
    }

    /// Starts a fresh full fetch, dropping the current mirror first.
    pub fn request_full_list(&mut self) {
        self.list.clear_items();
        self.push_query(SSI_REQUEST_LIST);
    }

    /// Tells the server to put the stored list into effect for presence
    /// and permit/deny. Sent once the full fetch has landed.
    pub fn activate(&mut self) {
        self.push_control(SSI_ACTIVATE);
    }

    // ---- authorization ----

    /// Asks a contact for permission to add them.
    ///
    /// Fire and forget: no local state changes, no queue entry. The answer
    /// arrives later as [`SsiEvent::AuthReplied`].
    pub fn request_authorization(&mut self, handle: &str, reason: &str) -> Result<()> {
        let mut body = BytesMut::with_capacity(1 + handle.len() + 2 + reason.len() + 2);
        put_name8(&mut body, handle)?;
        put_text16(&mut body, "reason", reason)?;
        body.put_u16(0x0000);
        self.outbox.push_back(OutboundSnac {
            subtype: SSI_AUTH_REQUEST,
            body: body.freeze(),
            kind: OutboundKind::Control,
        });
        Ok(())
    }

    /// Grants or denies another user's request to add this account.
    pub fn reply_authorization(&mut self, handle: &str, accept: bool, reason: &str) -> Result<()> {
        let mut body = BytesMut::with_capacity(1 + handle.len() + 1 + 2 + reason.len());
        put_name8(&mut body, handle)?;
        body.put_u8(u8::from(accept));
        put_text16(&mut body, "reason", reason)?;
        self.outbox.push_back(OutboundSnac {
            subtype: SSI_AUTH_REPLY,
            body: body.freeze(),
            kind: OutboundKind::Control,
        });
        Ok(())
    }

    // ---- inbound ----

    /// Ingests a full-fetch payload. `more_following` is the header flag
    /// saying further payloads complete the list.
    pub fn handle_list(&mut self, body: &[u8], more_following: bool) -> Result<()> {
        self.list.ingest_full_list(body)?;
        if !more_following {
            self.list.received_data = true;
            self.events.push_back(SsiEvent::ListReady {
                revision: self.list.revision,
                timestamp: self.list.timestamp,
            });
        }
        Ok(())
    }

    /// The server says our cached copy is current; no items follow.
    pub fn handle_list_unchanged(&mut self) {
        self.list.received_data = true;
        self.events.push_back(SsiEvent::ListReady {
            revision: self.list.revision,
            timestamp: self.list.timestamp,
        });
    }

    /// Parses the rights reply into the per-kind maxima.
    pub fn handle_rights(&mut self, body: &[u8]) -> Result<()> {
        let chain = Chain::decode(body)?;
        let maxima: Vec<u16> = chain
            .first(RIGHTS_MAXIMA)
            .map(|attr| {
                attr.value
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect()
            })
            .unwrap_or_default();
        self.rights = maxima.clone();
        self.events.push_back(SsiEvent::Rights { maxima });
        Ok(())
    }

    /// Records the request id a drained mutation was sent under, so its ack
    /// can be matched later.
    pub fn mutation_sent(&mut self, request_id: u32) {
        self.queue.sent(request_id);
    }

    /// Routes a mutation ack: one status code per item in the original
    /// request. The queue advances only when the id names the mutation
    /// actually in flight; stray acks are ignored. Error statuses advance
    /// the queue too, so one rejection never wedges it.
    pub fn handle_ack(&mut self, request_id: u32, body: &[u8]) -> Result<()> {
        if body.len() % 2 != 0 {
            return Err(SsiError::OddAckBody { len: body.len() });
        }
        let statuses: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        if !self.queue.matches(request_id) {
            debug!(request_id, "ack does not match the in-flight mutation");
            return Ok(());
        }
        if let Some(mutation) = self.queue.complete() {
            for (i, status) in statuses.iter().enumerate() {
                if *status != ACK_OK {
                    warn!(
                        subtype = mutation.subtype,
                        status = *status,
                        name = mutation.names.get(i).map(String::as_str).unwrap_or(""),
                        "server rejected mutation"
                    );
                }
            }
            self.events.push_back(SsiEvent::Acked {
                subtype: mutation.subtype,
                names: mutation.names,
                statuses,
            });
            self.pump_queue();
        }
        Ok(())
    }

    /// Parses an incoming authorization request into an event.
    pub fn handle_auth_request(&mut self, body: &[u8]) -> Result<()> {
        let mut cur = Cursor::new(body);
        let from = read_name8(&mut cur)?;
        let reason = read_text16(&mut cur)?;
        self.events.push_back(SsiEvent::AuthRequested { from, reason });
        Ok(())
    }

    /// Parses an incoming authorization answer into an event.
    pub fn handle_auth_reply(&mut self, body: &[u8]) -> Result<()> {
        let mut cur = Cursor::new(body);
        let from = read_name8(&mut cur)?;
        let granted = cur.read_u8()? != 0;
        let reason = read_text16(&mut cur)?;
        self.events.push_back(SsiEvent::AuthReplied {
            from,
            granted,
            reason,
        });
        Ok(())
    }

    /// Drops everything queued or in flight, for connection teardown.
    ///
    /// Nothing is retried; prepared but not yet drained SNACs are discarded
    /// with the queue.
    pub fn clear_queue(&mut self) {
        let dropped = self.queue.len() + usize::from(self.queue.waiting_for_ack());
        if dropped > 0 {
            debug!(dropped, "discarding unsent mutations");
        }
        self.queue.clear();
        self.outbox.clear();
    }
}

fn put_name8(dst: &mut BytesMut, name: &str) -> Result<()> {
    let len = name.len();
    if len > usize::from(u8::MAX) {
        return Err(SsiError::FieldTooLong {
            what: "screen name",
            len,
            max: usize::from(u8::MAX),
        });
    }
    dst.put_u8(len as u8);
    dst.put_slice(name.as_bytes());
    Ok(())
}

fn put_text16(dst: &mut BytesMut, what: &'static str, text: &str) -> Result<()> {
    let len = text.len();
    if len > usize::from(u16::MAX) {
        return Err(SsiError::FieldTooLong {
            what,
            len,
            max: usize::from(u16::MAX),
        });
    }
    dst.put_u16(len as u16);
    dst.put_slice(text.as_bytes());
    Ok(())
}

fn read_name8(cur: &mut Cursor<'_>) -> Result<String> {
    let len = cur.read_u8()? as usize;
    Ok(String::from_utf8_lossy(cur.read_slice(len)?).into_owned())
}

fn read_text16(cur: &mut Cursor<'_>) -> Result<String> {
    let len = cur.read_u16()? as usize;
    Ok(String::from_utf8_lossy(cur.read_slice(len)?).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ATTR_GROUP_MEMBERS;

    /// Decodes the single item inside a mutation body.
    fn decode_item(out: &OutboundSnac) -> SsiItem {
        let mut cur = Cursor::new(&out.body);
        let item = SsiItem::decode(&mut cur).unwrap();
        assert!(cur.is_empty(), "mutation bodies carry exactly one item");
        item
    }

    /// Acks the in-flight mutation under `id` and returns what was acked.
    fn ack_ok(engine: &mut SsiEngine, id: u32) {
        engine.mutation_sent(id);
        engine.handle_ack(id, &[0x00, 0x00]).unwrap();
    }

    /// Drains outbound SNACs until the outbox is empty, acking every
    /// mutation, and returns the subtypes seen.
    fn drain_acking(engine: &mut SsiEngine) -> Vec<u16> {
        let mut subtypes = Vec::new();
        let mut id = 100;
        while let Some(out) = engine.next_outbound() {
            subtypes.push(out.subtype);
            if out.kind == OutboundKind::Mutation {
                id += 1;
                ack_ok(engine, id);
            }
        }
        subtypes
    }

    #[test]
    fn test_add_buddy_into_missing_group() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();

        // The mirror reflects both new items immediately.
        assert!(engine.list().find_group("Friends").is_some());
        assert!(engine.list().find_buddy_in_group("Friends", "alice").is_some());

        // The edit window opens, then exactly one mutation is in flight.
        let start = engine.next_outbound().unwrap();
        assert_eq!((start.subtype, start.kind), (SSI_EDIT_START, OutboundKind::Control));

        let add_group = engine.next_outbound().unwrap();
        assert_eq!((add_group.subtype, add_group.kind), (SSI_ADD, OutboundKind::Mutation));
        let group = decode_item(&add_group);
        assert_eq!(group.kind, ItemKind::Group);
        assert_eq!(group.name.as_deref(), Some("Friends"));
        assert_eq!(group.group_id, 1);

        assert!(engine.next_outbound().is_none());
        assert!(engine.waiting_for_ack());
        assert_eq!(engine.queued_mutations(), 2);

        // An ack for some other request id changes nothing.
        engine.mutation_sent(11);
        engine.handle_ack(99, &[0x00, 0x00]).unwrap();
        assert!(engine.next_outbound().is_none());
        assert!(engine.waiting_for_ack());

        // The matching ack dispatches the buddy add.
        engine.handle_ack(11, &[0x00, 0x00]).unwrap();
        let add_buddy = engine.next_outbound().unwrap();
        assert_eq!(add_buddy.subtype, SSI_ADD);
        let buddy = decode_item(&add_buddy);
        assert_eq!(buddy.kind, ItemKind::Buddy);
        assert_eq!(buddy.name.as_deref(), Some("alice"));
        assert_eq!((buddy.group_id, buddy.item_id), (1, 1));

        // Then the membership update, snapshotted with the new buddy in it.
        ack_ok(&mut engine, 12);
        let modify = engine.next_outbound().unwrap();
        assert_eq!(modify.subtype, SSI_MODIFY);
        let updated = decode_item(&modify);
        assert_eq!(
            updated.attrs.first(ATTR_GROUP_MEMBERS).unwrap().value.as_ref(),
            &[0x00, 0x01]
        );

        // Last ack drains the queue and closes the edit window.
        ack_ok(&mut engine, 13);
        let stop = engine.next_outbound().unwrap();
        assert_eq!(stop.subtype, SSI_EDIT_STOP);
        assert!(engine.next_outbound().is_none());
    }

    #[test]
    fn test_add_buddy_into_existing_group_queues_two() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();
        drain_acking(&mut engine);

        engine.add_buddy("Friends", "bob").unwrap();
        let subtypes = drain_acking(&mut engine);
        assert_eq!(subtypes, [SSI_EDIT_START, SSI_ADD, SSI_MODIFY, SSI_EDIT_STOP]);

        // Fresh item id under the same group.
        let bob = engine.list().find_buddy_in_group("Friends", "bob").unwrap();
        assert_eq!((bob.group_id, bob.item_id), (1, 2));
    }

    #[test]
    fn test_add_buddy_is_idempotent() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();
        drain_acking(&mut engine);

        engine.add_buddy("Friends", "ALICE").unwrap();
        assert!(engine.next_outbound().is_none());
    }

    #[test]
    fn test_awaiting_auth_flag_on_item() {
        let mut engine = SsiEngine::new();
        engine.add_buddy_awaiting_auth("Friends", "carol").unwrap();

        engine.next_outbound();
        engine.next_outbound();
        ack_ok(&mut engine, 5);
        let add = engine.next_outbound().unwrap();
        assert_eq!(add.subtype, SSI_ADD);
        assert!(decode_item(&add).awaiting_auth());
    }

    #[test]
    fn test_remove_last_buddy_cascades_to_group() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();
        drain_acking(&mut engine);

        engine.remove_buddy("Friends", "alice").unwrap();
        assert!(engine.list().find_buddy_in_group("Friends", "alice").is_none());
        assert!(engine.list().find_group("Friends").is_none());

        let subtypes = drain_acking(&mut engine);
        assert_eq!(
            subtypes,
            [SSI_EDIT_START, SSI_DELETE, SSI_MODIFY, SSI_DELETE, SSI_EDIT_STOP]
        );
    }

    #[test]
    fn test_remove_buddy_keeps_populated_group() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();
        engine.add_buddy("Friends", "bob").unwrap();
        drain_acking(&mut engine);

        engine.remove_buddy("Friends", "alice").unwrap();
        let subtypes = drain_acking(&mut engine);
        assert_eq!(subtypes, [SSI_EDIT_START, SSI_DELETE, SSI_MODIFY, SSI_EDIT_STOP]);

        let group = engine.list().find_group("Friends").unwrap();
        assert_eq!(
            group.attrs.first(ATTR_GROUP_MEMBERS).unwrap().value.as_ref(),
            &[0x00, 0x02]
        );
    }

    #[test]
    fn test_remove_unknown_buddy_fails() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();
        drain_acking(&mut engine);

        assert!(matches!(
            engine.remove_buddy("Nowhere", "alice"),
            Err(SsiError::GroupNotFound { .. })
        ));
        assert!(matches!(
            engine.remove_buddy("Friends", "nobody"),
            Err(SsiError::BuddyNotFound { .. })
        ));
    }

    #[test]
    fn test_move_buddy_reallocates_item_id() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Work", "alice").unwrap();
        engine.add_buddy("Home", "marta").unwrap();
        drain_acking(&mut engine);

        engine.move_buddy("Work", "Home", "alice").unwrap();
        let subtypes = drain_acking(&mut engine);
        assert_eq!(
            subtypes,
            [SSI_EDIT_START, SSI_DELETE, SSI_ADD, SSI_MODIFY, SSI_MODIFY, SSI_EDIT_STOP]
        );

        let moved = engine.list().find_buddy_in_group("Home", "alice").unwrap();
        let home = engine.list().find_group("Home").unwrap();
        assert_eq!(moved.group_id, home.group_id);
        // marta holds id 1 in Home, so alice gets 2.
        assert_eq!(moved.item_id, 2);

        // A move never cascades: the emptied source group stays, with its
        // members attribute dropped.
        let work = engine.list().find_group("Work").unwrap();
        assert!(!work.attrs.contains(ATTR_GROUP_MEMBERS));
    }

    #[test]
    fn test_permit_deny_items() {
        let mut engine = SsiEngine::new();
        engine.add_permit("alice").unwrap();
        engine.add_deny("mallory").unwrap();
        let subtypes = drain_acking(&mut engine);
        assert_eq!(
            subtypes,
            [SSI_EDIT_START, SSI_ADD, SSI_ADD, SSI_EDIT_STOP]
        );

        let permit = engine.list().find_named(ItemKind::Permit, "alice").unwrap();
        assert_eq!(permit.group_id, 0);
        let deny = engine.list().find_named(ItemKind::Deny, "mallory").unwrap();
        // Ids are unique across kinds at the top level.
        assert_ne!(permit.item_id, deny.item_id);

        engine.remove_permit("alice").unwrap();
        assert!(engine.list().find_named(ItemKind::Permit, "alice").is_none());
        assert!(matches!(
            engine.remove_permit("alice"),
            Err(SsiError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_set_privacy_creates_then_modifies() {
        let mut engine = SsiEngine::new();
        assert_eq!(engine.privacy_mode(), None);

        engine.set_privacy(PrivacyMode::DenySome, 0xffff_ffff).unwrap();
        let subtypes = drain_acking(&mut engine);
        assert_eq!(subtypes, [SSI_EDIT_START, SSI_ADD, SSI_EDIT_STOP]);
        assert_eq!(engine.privacy_mode(), Some(PrivacyMode::DenySome));

        engine.set_privacy(PrivacyMode::PermitAll, 0x0000_000f).unwrap();
        let subtypes = drain_acking(&mut engine);
        assert_eq!(subtypes, [SSI_EDIT_START, SSI_MODIFY, SSI_EDIT_STOP]);
        assert_eq!(engine.privacy_mode(), Some(PrivacyMode::PermitAll));

        let item = engine.list().find_first_of_kind(ItemKind::PdInfo).unwrap();
        assert_eq!(
            item.attrs.first(ATTR_PRIVACY_CLASSES).unwrap().value_u32(),
            Some(0x0000_000f)
        );
    }

    #[test]
    fn test_full_fetch_and_ready_event() {
        let mut engine = SsiEngine::new();
        engine.request_full_list();
        let req = engine.next_outbound().unwrap();
        assert_eq!((req.subtype, req.kind), (SSI_REQUEST_LIST, OutboundKind::Query));

        // Server splits the list across two payloads.
        let mut seed = SsiEngine::new();
        seed.add_buddy("Friends", "alice").unwrap();
        // Build payloads out of encoded items directly.
        let group = seed.list().find_group("Friends").unwrap().clone();
        let buddy = seed
            .list()
            .find_buddy_in_group("Friends", "alice")
            .unwrap()
            .clone();

        let mut first = BytesMut::new();
        first.put_u8(0x00);
        first.put_u16(7);
        group.encode_into(&mut first).unwrap();
        first.put_u32(0);

        let mut second = BytesMut::new();
        second.put_u8(0x00);
        second.put_u16(0);
        buddy.encode_into(&mut second).unwrap();
        second.put_u32(0x1111_2222);

        engine.handle_list(&first, true).unwrap();
        assert!(engine.next_event().is_none());
        assert!(!engine.list().received_data);

        engine.handle_list(&second, false).unwrap();
        assert_eq!(
            engine.next_event(),
            Some(SsiEvent::ListReady {
                revision: 7,
                timestamp: 0x1111_2222
            })
        );
        assert!(engine.list().received_data);
        assert_eq!(engine.list().len(), 2);
    }

    #[test]
    fn test_list_unchanged_still_readies_mirror() {
        let mut engine = SsiEngine::new();
        engine.request_full_list();
        engine.next_outbound();

        engine.handle_list_unchanged();
        assert!(matches!(engine.next_event(), Some(SsiEvent::ListReady { .. })));
        assert!(engine.list().received_data);
        assert!(engine.list().is_empty());
    }

    #[test]
    fn test_rights_maxima() {
        let mut engine = SsiEngine::new();
        let mut chain = Chain::new();
        chain.push(Attribute::new(0x0004, vec![0x01, 0x90, 0x00, 0x3d, 0x00, 0xc8]));
        engine.handle_rights(&chain.to_bytes().unwrap()).unwrap();

        assert_eq!(
            engine.next_event(),
            Some(SsiEvent::Rights {
                maxima: vec![0x0190, 0x003d, 0x00c8]
            })
        );
        assert_eq!(engine.rights(), [0x0190, 0x003d, 0x00c8]);
    }

    #[test]
    fn test_error_ack_still_advances_queue() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();

        engine.next_outbound(); // edit-start
        engine.next_outbound(); // add group
        engine.mutation_sent(21);
        engine
            .handle_ack(21, &ACK_AUTH_REQUIRED.to_be_bytes())
            .unwrap();

        assert_eq!(
            engine.next_event(),
            Some(SsiEvent::Acked {
                subtype: SSI_ADD,
                names: vec!["Friends".to_string()],
                statuses: vec![ACK_AUTH_REQUIRED]
            })
        );
        // The next mutation went out regardless of the error status.
        assert_eq!(engine.next_outbound().unwrap().subtype, SSI_ADD);
    }

    #[test]
    fn test_odd_ack_body_is_rejected() {
        let mut engine = SsiEngine::new();
        engine.add_buddy("Friends", "alice").unwrap();
        engine.next_outbound();
        engine.next_outbound();
        engine.mutation_sent(4);

        assert!(matches!(
            engine.handle_ack(4, &[0x00]),
            Err(SsiError::OddAckBody { len: 1 })
        ));
        // The queue did not advance on the malformed ack.
        assert!(engine.waiting_for_ack());
    }

    #[test]
    fn test_auth_request_wire_format() {
        let mut engine = SsiEngine::new();
        engine.request_authorization("12345", "plz").unwrap();

        let out = engine.next_outbound().unwrap();
        assert_eq!((out.subtype, out.kind), (SSI_AUTH_REQUEST, OutboundKind::Control));
        assert_eq!(
            out.body.as_ref(),
            &[
                0x05, b'1', b'2', b'3', b'4', b'5', // screen name
                0x00, 0x03, b'p', b'l', b'z', // reason
                0x00, 0x00, // trailing zero word
            ]
        );
    }

    #[test]
    fn test_auth_reply_wire_format() {
        let mut engine = SsiEngine::new();
        engine.reply_authorization("99", true, "ok").unwrap();

        let out = engine.next_outbound().unwrap();
        assert_eq!(out.subtype, SSI_AUTH_REPLY);
        assert_eq!(
            out.body.as_ref(),
            &[0x02, b'9', b'9', 0x01, 0x00, 0x02, b'o', b'k']
        );
    }

    #[test]
    fn test_incoming_auth_events() {
        let mut engine = SsiEngine::new();

        engine
            .handle_auth_request(&[0x02, b'4', b'2', 0x00, 0x02, b'h', b'i', 0x00, 0x00])
            .unwrap();
        assert_eq!(
            engine.next_event(),
            Some(SsiEvent::AuthRequested {
                from: "42".to_string(),
                reason: "hi".to_string()
            })
        );

        engine
            .handle_auth_reply(&[0x02, b'4', b'2', 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(
            engine.next_event(),
            Some(SsiEvent::AuthReplied {
                from: "42".to_string(),
                granted: false,
                reason: String::new()
            })
        );

        // Truncated bodies fail without panicking.
        assert!(engine.handle_auth_request(&[0x05, b'x']).is_err());
    }

    #[test]
    fn test_oversize_auth_fields_fail() {
        let mut engine = SsiEngine::new();
        let long = "x".repeat(300);
        assert!(matches!(
            engine.request_authorization(&long, ""),
            Err(SsiError::FieldTooLong { what: "screen name", .. })
        ));
        assert!(engine.next_outbound().is_none());
    }

    #[test]
    fn test_unencodable_name_queues_nothing() {
        let mut engine = SsiEngine::new();
        let long = "x".repeat(70_000);

        assert!(matches!(
            engine.add_permit(&long),
            Err(SsiError::FieldTooLong { what: "item name", .. })
        ));
        // Nothing was queued or mirrored and no edit window opened.
        assert!(engine.next_outbound().is_none());
        assert!(!engine.waiting_for_ack());
        assert!(engine.list().find_named(ItemKind::Permit, &long).is_none());
    }

    #[test]
    fn test_clear_queue_discards_unsent_mutations() {
        let mut engine = SsiEngine::new();
        // Three mutations total: add group, add buddy, modify group.
        engine.add_buddy("Friends", "alice").unwrap();
        assert!(engine.waiting_for_ack());
        assert_eq!(engine.queued_mutations(), 2);

        engine.clear_queue();
        assert!(!engine.waiting_for_ack());
        assert_eq!(engine.queued_mutations(), 0);
        assert!(engine.next_outbound().is_none());

        // A late ack for the discarded in-flight mutation is a no-op.
        engine.handle_ack(11, &[0x00, 0x00]).unwrap();
        assert!(engine.next_outbound().is_none());
        assert!(engine.next_event().is_none());
    }
}
