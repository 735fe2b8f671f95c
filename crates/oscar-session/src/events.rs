//! Events the session delivers to the embedding gateway.

use oscar_ssi::SsiEvent;

use crate::connection::{ConnId, ConnKind};

/// Something the embedding gateway should react to.
///
/// Events queue up inside the session while it pumps; the gateway drains
/// them with `next_event` after each pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A connection finished negotiating and may carry traffic.
    Ready { conn: ConnId, kind: ConnKind },
    /// The server announced it is closing a connection. Teardown follows;
    /// a [`SessionEvent::Closed`] for the same connection comes right after.
    CloseNotice {
        conn: ConnId,
        code: Option<u16>,
        message: Option<String>,
    },
    /// A connection is gone, whatever the cause.
    Closed { conn: ConnId, kind: ConnKind },
    /// A service redirect was followed; the new connection is negotiating.
    Redirected { service: u16, conn: ConnId },
    /// A buddy-list event.
    Ssi(SsiEvent),
}
