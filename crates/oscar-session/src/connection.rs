//! One logical OSCAR connection.
//!
//! A session holds several of these at once: the short-lived authorizer
//! connection, the main BOS connection, and chat-related connections opened
//! on demand through redirects. Each owns its stream, its FLAP sequence
//! counter and its own handler table.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use oscar_transport::Dialer;
use oscar_wire::flap::{channel_name, encode_frame, FLAP_HEADER_LEN};
use oscar_wire::SnacHeader;

use crate::error::Result;
use crate::pending::PendingRequest;
use crate::session::Session;

/// Identifies one connection within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u32);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role a connection plays in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnKind {
    /// Initial login connection; torn down once the BOS cookie is issued.
    Auth,
    /// Basic OSCAR Service, the main connection; lives for the session.
    Bos,
    /// Chat navigation (room directory), opened on demand.
    ChatNav,
    /// One joined chat room.
    Chat,
}

impl ConnKind {
    /// Service id used in service requests and redirects for this kind.
    pub fn service_id(self) -> Option<u16> {
        match self {
            ConnKind::Auth => None,
            ConnKind::Bos => Some(0x0002),
            ConnKind::ChatNav => Some(0x000d),
            ConnKind::Chat => Some(0x000e),
        }
    }

    /// Maps a redirect's service id to the kind of connection to open.
    pub fn from_service_id(id: u16) -> Option<Self> {
        match id {
            0x0002 => Some(ConnKind::Bos),
            0x000d => Some(ConnKind::ChatNav),
            0x000e => Some(ConnKind::Chat),
            _ => None,
        }
    }
}

/// Connection lifecycle.
///
/// Name resolution and the TCP dial happen synchronously inside the dialer
/// before the connection exists, so the first observable state is
/// `Connecting` (waiting for the server's channel-1 hello).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Dialed; waiting for the server hello.
    Connecting,
    /// Hello answered (with the cookie on service connections); waiting for
    /// the server's capability list.
    Authenticating,
    /// Fully negotiated; carries traffic.
    Ready,
    /// Torn down. Terminal.
    Closed,
}

/// Handler for one `(family, subtype)` pair on one connection.
///
/// Handlers get the whole session so they can send replies, open further
/// connections or drive the buddy-list engine. When the inbound SNAC's
/// request id matched a pending request, that request is popped and passed
/// along; the body has any leading versioning TLV block already stripped.
pub type Handler<D> =
    fn(&mut Session<D>, ConnId, &SnacHeader, Option<PendingRequest>, &[u8]) -> Result<()>;

/// One open connection: stream, sequence counter, handler table.
pub struct Connection<D: Dialer> {
    pub(crate) id: ConnId,
    pub(crate) kind: ConnKind,
    pub(crate) state: ConnState,
    pub(crate) stream: D::Stream,
    seq: u16,
    /// Bytes read but not yet framed.
    pub(crate) read_buf: BytesMut,
    pub(crate) handlers: HashMap<(u16, u16), Handler<D>>,
    /// SNAC families the server allows here; populated at `Ready`.
    pub(crate) allowed_families: Vec<u16>,
    /// Login cookie presented in the hello reply on service connections.
    pub(crate) cookie: Option<Bytes>,
}

impl<D: Dialer> Connection<D> {
    pub(crate) fn new(id: ConnId, kind: ConnKind, stream: D::Stream, cookie: Option<Bytes>) -> Self {
        Self {
            id,
            kind,
            state: ConnState::Connecting,
            stream,
            seq: 0,
            read_buf: BytesMut::new(),
            handlers: HashMap::new(),
            allowed_families: Vec::new(),
            cookie,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn kind(&self) -> ConnKind {
        self.kind
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Next outbound sequence number. Assigned at send time, monotonically
    /// increasing, wrapping at u16 overflow.
    fn next_seq(&mut self) -> u16 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Frames a payload and writes it to the stream.
    ///
    /// Writes go straight out; a full kernel buffer surfaces as an I/O
    /// error rather than queueing. OSCAR client traffic is small enough
    /// that this does not happen outside a stalled peer.
    pub(crate) fn write_frame(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        let seq = self.next_seq();
        let mut buf = BytesMut::with_capacity(FLAP_HEADER_LEN + payload.len());
        encode_frame(channel, seq, payload, &mut buf)?;
        self.stream.write_all(&buf)?;
        trace!(
            conn = %self.id,
            channel = channel_name(channel),
            seq,
            len = payload.len(),
            "frame out"
        );
        Ok(())
    }
}
