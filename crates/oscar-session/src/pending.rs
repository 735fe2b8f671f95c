//! Correlation of request SNACs with their replies.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::connection::ConnId;

/// Why a request was sent; handed to the handler of its correlated reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestContext {
    /// A service request; the reply is a redirect to the service host.
    ServiceRequest { service: u16 },
    /// A buddy-list mutation; the reply is its ack.
    SsiMutation,
    /// A buddy-list query (rights, full fetch).
    SsiQuery,
}

/// One sent SNAC awaiting its reply.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub request_id: u32,
    /// Connection the request went out on.
    pub conn: ConnId,
    pub family: u16,
    pub subtype: u16,
    pub context: RequestContext,
    /// When the request was sent, for [`PendingStore::sweep`].
    pub issued_at: Instant,
}

/// Outstanding requests keyed by request id, plus the id allocator.
///
/// One store serves the whole session: request ids are unique across every
/// connection, so a reply identifies its request with no further context.
#[derive(Debug)]
pub struct PendingStore {
    next_id: u32,
    pending: HashMap<u32, PendingRequest>,
}

impl Default for PendingStore {
    fn default() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Allocates the next request id.
    ///
    /// Ids increase monotonically and wrap at u32 overflow, skipping zero
    /// and any id still pending so an id is never reused while its reply
    /// may yet arrive.
    pub fn allocate(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Registers a sent request expecting a reply.
    pub fn insert(&mut self, request: PendingRequest) {
        self.pending.insert(request.request_id, request);
    }

    /// Pops the request a reply's id correlates to.
    pub fn take(&mut self, request_id: u32) -> Option<PendingRequest> {
        self.pending.remove(&request_id)
    }

    /// Drops every request sent on a closing connection; returns how many.
    pub fn remove_for_connection(&mut self, conn: ConnId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.conn != conn);
        before - self.pending.len()
    }

    /// Discards requests older than `max_age`; returns how many.
    ///
    /// Nothing calls this automatically. It exists so the embedding gateway
    /// can garbage-collect requests whose replies will never come, on its
    /// own housekeeping timer.
    pub fn sweep(&mut self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.pending.len();
        self.pending
            .retain(|_, p| now.saturating_duration_since(p.issued_at) <= max_age);
        before - self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u32, conn: u32, issued_at: Instant) -> PendingRequest {
        PendingRequest {
            request_id: id,
            conn: ConnId(conn),
            family: 0x0013,
            subtype: 0x0008,
            context: RequestContext::SsiMutation,
            issued_at,
        }
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut store = PendingStore::new();
        let ids: Vec<u32> = (0..100).map(|_| store.allocate()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(ids[0], 1);
    }

    #[test]
    fn test_take_pops_exactly_one() {
        let mut store = PendingStore::new();
        let id = store.allocate();
        store.insert(request(id, 1, Instant::now()));

        assert!(store.take(id + 1).is_none());
        let popped = store.take(id).unwrap();
        assert_eq!(popped.request_id, id);
        assert!(store.take(id).is_none());
    }

    #[test]
    fn test_wraparound_skips_zero_and_pending_ids() {
        let mut store = PendingStore {
            next_id: u32::MAX,
            pending: HashMap::new(),
        };
        store.insert(request(u32::MAX, 1, Instant::now()));

        // u32::MAX is still pending, so the allocator wraps past zero to 1.
        assert_eq!(store.allocate(), 1);
        assert_eq!(store.allocate(), 2);
    }

    #[test]
    fn test_remove_for_connection() {
        let mut store = PendingStore::new();
        store.insert(request(1, 7, Instant::now()));
        store.insert(request(2, 7, Instant::now()));
        store.insert(request(3, 9, Instant::now()));

        assert_eq!(store.remove_for_connection(ConnId(7)), 2);
        assert_eq!(store.len(), 1);
        assert!(store.take(3).is_some());
    }

    #[test]
    fn test_sweep_drops_only_stale_requests() {
        let mut store = PendingStore::new();
        let stale = Instant::now() - Duration::from_secs(120);
        store.insert(request(1, 1, stale));
        store.insert(request(2, 1, Instant::now()));

        assert_eq!(store.sweep(Duration::from_secs(60)), 1);
        assert!(store.take(1).is_none());
        assert!(store.take(2).is_some());
    }
}
