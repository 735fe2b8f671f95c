//! The mutation holding queue.
//!
//! Item mutations must reach the server strictly one at a time: an edit
//! window is opened with an edit-start control message, each add/modify/
//! delete waits for the ack of the previous one before the next is sent,
//! and the window is closed with edit-stop once the queue drains.

use std::collections::VecDeque;

use bytes::Bytes;

/// One queued add/modify/delete, body already encoded.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Subtype of the SNAC to send (add, modify or delete).
    pub subtype: u16,
    /// Names of the affected items, reported back with the ack.
    pub names: Vec<String>,
    /// Encoded item payload.
    pub body: Bytes,
}

#[derive(Debug)]
struct InFlight {
    mutation: Mutation,
    request_id: Option<u32>,
}

/// FIFO of not-yet-sent mutations plus the one awaiting its ack.
#[derive(Debug, Default)]
pub struct MutationQueue {
    queued: VecDeque<Mutation>,
    in_flight: Option<InFlight>,
    editing: bool,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued, not-yet-sent mutations.
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// `true` while a sent mutation has not been acked yet.
    pub fn waiting_for_ack(&self) -> bool {
        self.in_flight.is_some()
    }

    /// `true` while an edit window is open on the wire.
    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Appends a mutation. Returns `true` when the caller must emit the
    /// edit-start control message first: the window was not yet open.
    pub fn push(&mut self, mutation: Mutation) -> bool {
        let open_window = !self.editing;
        self.editing = true;
        self.queued.push_back(mutation);
        open_window
    }

    /// Moves the next mutation in flight, unless one already is.
    pub fn start_next(&mut self) -> Option<&Mutation> {
        if self.in_flight.is_some() {
            return None;
        }
        let mutation = self.queued.pop_front()?;
        let slot = self.in_flight.insert(InFlight {
            mutation,
            request_id: None,
        });
        Some(&slot.mutation)
    }

    /// Records the request id the in-flight mutation was sent under.
    pub fn sent(&mut self, request_id: u32) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.request_id = Some(request_id);
        }
    }

    /// `true` when `request_id` names the mutation currently in flight.
    pub fn matches(&self, request_id: u32) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.request_id == Some(request_id))
    }

    /// Takes the acked in-flight mutation out.
    pub fn complete(&mut self) -> Option<Mutation> {
        self.in_flight.take().map(|f| f.mutation)
    }

    /// Closes the edit window once everything is sent and acked. Returns
    /// `true` when the caller must emit the edit-stop control message.
    pub fn close_if_drained(&mut self) -> bool {
        if self.editing && self.in_flight.is_none() && self.queued.is_empty() {
            self.editing = false;
            true
        } else {
            false
        }
    }

    /// Discards every queued and in-flight mutation without sending.
    pub fn clear(&mut self) {
        self.queued.clear();
        self.in_flight = None;
        self.editing = false;
    }
}
