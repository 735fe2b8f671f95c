//! The session: owns every connection, routes frames, drives the engines.
//!
//! A [`Session`] is single-threaded and reactor-driven: the embedding
//! gateway watches the streams for readability and calls [`Session::pump`]
//! on the connection that has bytes. Pumping reads everything available,
//! decodes complete frames, and dispatches them; anything the gateway
//! should react to accumulates as [`SessionEvent`]s to drain afterwards.
//! No timers live here: keepalives and pending-request sweeps are exposed
//! as explicit calls for the gateway's own clock.

use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, trace, warn};

use oscar_ssi::{
    OutboundKind, PrivacyMode, SsiEngine, FAMILY_SSI, SSI_ACK, SSI_AUTH_REPLIED,
    SSI_AUTH_REQUESTED, SSI_LIST, SSI_LIST_UNCHANGED, SSI_RIGHTS,
};
use oscar_transport::Dialer;
use oscar_wire::flap::{
    channel_name, decode_frame, CHANNEL_CLOSE, CHANNEL_DATA, CHANNEL_ERROR, CHANNEL_HELLO,
    CHANNEL_KEEPALIVE,
};
use oscar_wire::snac::{strip_version_block, FLAG_MORE_FOLLOWING};
use oscar_wire::{Attribute, Chain, Cursor, Frame, SnacHeader, SNAC_HEADER_LEN};

use crate::config::SessionConfig;
use crate::connection::{ConnId, ConnKind, ConnState, Connection, Handler};
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::pending::{PendingRequest, PendingStore, RequestContext};

/// Generic-service family: host online, service requests, redirects.
pub const FAMILY_GENERIC: u16 = 0x0001;
/// The server announces the SNAC families a connection may carry.
pub const GENERIC_HOST_ONLINE: u16 = 0x0003;
/// Ask for a service connection; the body is the u16 service id.
pub const GENERIC_SERVICE_REQUEST: u16 = 0x0004;
/// Redirect to another host for a requested service.
pub const GENERIC_SERVICE_REDIRECT: u16 = 0x0005;

/// FLAP protocol version sent in every channel-1 hello reply.
const FLAP_VERSION: u32 = 0x0000_0001;

/// Hello-reply and redirect attribute carrying a login cookie.
const ATTR_COOKIE: u16 = 0x0006;
/// Redirect attribute: u16 service id.
const ATTR_SERVICE_ID: u16 = 0x000d;
/// Redirect attribute: `host` or `host:port` string.
const ATTR_HOST: u16 = 0x0005;
/// Close-notice attribute: u16 close code.
const ATTR_CLOSE_CODE: u16 = 0x0009;
/// Close-notice attribute: human-readable message or URL.
const ATTR_CLOSE_MESSAGE: u16 = 0x000b;

/// One OSCAR session: a set of connections, the shared pending-request
/// store, the buddy-list engine and the event queue.
pub struct Session<D: Dialer> {
    config: SessionConfig,
    dialer: D,
    connections: HashMap<ConnId, Connection<D>>,
    next_conn_id: u32,
    pending: PendingStore,
    ssi: SsiEngine,
    events: VecDeque<SessionEvent>,
}

impl<D: Dialer> Session<D> {
    pub fn new(config: SessionConfig, dialer: D) -> Self {
        Self {
            config,
            dialer,
            connections: HashMap::new(),
            next_conn_id: 1,
            pending: PendingStore::new(),
            ssi: SsiEngine::new(),
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read access to the buddy-list engine and its local mirror.
    pub fn ssi(&self) -> &SsiEngine {
        &self.ssi
    }

    /// Next queued event, oldest first.
    pub fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Outstanding requests awaiting replies.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Discards pending requests older than `max_age`; returns how many.
    /// Nothing calls this automatically; wire it to a housekeeping timer.
    pub fn sweep_pending(&mut self, max_age: Duration) -> usize {
        let swept = self.pending.sweep(max_age);
        if swept > 0 {
            debug!(swept, "dropped stale pending requests");
        }
        swept
    }

    pub fn connection_state(&self, id: ConnId) -> Option<ConnState> {
        self.connections.get(&id).map(Connection::state)
    }

    pub fn connection_kind(&self, id: ConnId) -> Option<ConnKind> {
        self.connections.get(&id).map(Connection::kind)
    }

    /// Families the server allows on a connection; empty until `Ready`.
    pub fn allowed_families(&self, id: ConnId) -> Option<&[u16]> {
        self.connections
            .get(&id)
            .map(|c| c.allowed_families.as_slice())
    }

    // ---- opening and closing connections ----

    /// Dials the configured authorizer host.
    ///
    /// The login exchange itself (family 0x0017) is the caller's protocol,
    /// registered through [`Session::register_handler`]; once it yields the
    /// BOS address and cookie, follow with [`Session::connect_service`].
    pub fn connect_auth(&mut self) -> Result<ConnId> {
        let host = self.config.login_host.clone();
        let port = self.config.login_port;
        self.open_connection(ConnKind::Auth, &host, port, None)
    }

    /// Dials a service host, presenting `cookie` in the hello reply.
    pub fn connect_service(
        &mut self,
        kind: ConnKind,
        host: &str,
        port: u16,
        cookie: Bytes,
    ) -> Result<ConnId> {
        self.open_connection(kind, host, port, Some(cookie))
    }

    fn open_connection(
        &mut self,
        kind: ConnKind,
        host: &str,
        port: u16,
        cookie: Option<Bytes>,
    ) -> Result<ConnId> {
        let stream = self.dialer.dial(host, port)?;
        let id = ConnId(self.next_conn_id);
        self.next_conn_id += 1;
        let mut conn = Connection::new(id, kind, stream, cookie);
        install_default_handlers(&mut conn);
        info!(conn = %id, ?kind, host, port, "connection opened");
        self.connections.insert(id, conn);
        Ok(id)
    }

    /// Closes a connection immediately: no draining, no retries.
    ///
    /// Pending requests sent on it are discarded; closing the BOS
    /// connection also discards unsent buddy-list mutations.
    pub fn close(&mut self, id: ConnId) -> Result<()> {
        if !self.connections.contains_key(&id) {
            return Err(SessionError::UnknownConnection(id));
        }
        self.teardown(id);
        Ok(())
    }

    fn teardown(&mut self, id: ConnId) {
        let Some(mut conn) = self.connections.remove(&id) else {
            return;
        };
        conn.state = ConnState::Closed;
        let dropped = self.pending.remove_for_connection(id);
        if conn.kind == ConnKind::Bos {
            self.ssi.clear_queue();
        }
        info!(conn = %id, kind = ?conn.kind, dropped_pending = dropped, "connection closed");
        self.events.push_back(SessionEvent::Closed {
            conn: id,
            kind: conn.kind,
        });
    }

    // ---- pumping and dispatch ----

    /// Pumps one connection: reads whatever bytes are available, then
    /// decodes and dispatches every complete frame.
    ///
    /// Call this when the embedding reactor reports the stream readable.
    /// End of stream dispatches what was buffered and then tears the
    /// connection down, surfacing [`SessionEvent::Closed`]; a malformed
    /// frame or I/O failure tears down too and returns the error.
    pub fn pump(&mut self, id: ConnId) -> Result<()> {
        let max_payload = self.config.flap.max_payload;
        let mut eof = false;
        let mut fatal = None;
        {
            let conn = self
                .connections
                .get_mut(&id)
                .ok_or(SessionError::UnknownConnection(id))?;
            let mut chunk = [0u8; 4096];
            loop {
                match conn.stream.read(&mut chunk) {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(n) => conn.read_buf.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        fatal = Some(e);
                        break;
                    }
                }
            }
        }
        if let Some(e) = fatal {
            warn!(conn = %id, error = %e, "read failed");
            self.teardown(id);
            return Err(e.into());
        }

        loop {
            // A handler may have torn the connection down mid-loop.
            let Some(conn) = self.connections.get_mut(&id) else {
                return Ok(());
            };
            let frame = match decode_frame(&mut conn.read_buf, max_payload) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!(conn = %id, error = %e, "fatal framing error");
                    self.teardown(id);
                    return Err(e.into());
                }
            };
            self.dispatch_frame(id, frame)?;
        }

        if eof {
            debug!(conn = %id, "end of stream");
            self.teardown(id);
        }
        Ok(())
    }

    fn dispatch_frame(&mut self, id: ConnId, frame: Frame) -> Result<()> {
        trace!(
            conn = %id,
            channel = channel_name(frame.channel),
            seq = frame.seq,
            len = frame.payload.len(),
            "frame in"
        );
        match frame.channel {
            CHANNEL_HELLO => self.handle_hello(id, &frame.payload),
            CHANNEL_DATA => self.dispatch_data(id, &frame.payload),
            CHANNEL_ERROR => {
                warn!(conn = %id, len = frame.payload.len(), "error frame");
                Ok(())
            }
            CHANNEL_CLOSE => self.handle_close_frame(id, &frame.payload),
            CHANNEL_KEEPALIVE => Ok(()),
            other => {
                debug!(conn = %id, channel = other, "unknown channel; dropping frame");
                Ok(())
            }
        }
    }

    /// Answers the server's channel-1 hello: the FLAP version, plus the
    /// login cookie on service connections.
    fn handle_hello(&mut self, id: ConnId, payload: &[u8]) -> Result<()> {
        if payload.len() >= 4 {
            let version = Cursor::new(payload).read_u32()?;
            trace!(conn = %id, version, "server hello");
        }
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(SessionError::UnknownConnection(id))?;

        let mut reply = BytesMut::with_capacity(4);
        reply.put_u32(FLAP_VERSION);
        if let Some(cookie) = conn.cookie.clone() {
            let mut chain = Chain::new();
            chain.push(Attribute::new(ATTR_COOKIE, cookie));
            chain.encode_into(&mut reply)?;
        }
        conn.write_frame(CHANNEL_HELLO, &reply)?;
        conn.state = ConnState::Authenticating;
        debug!(conn = %id, "authenticating");
        Ok(())
    }

    /// Routes a data frame to the handler registered for its SNAC key.
    ///
    /// An unreadable header is connection-fatal; a SNAC nobody registered
    /// for is logged and dropped. The pending request matching the header's
    /// request id, if any, is popped here and handed to the handler.
    fn dispatch_data(&mut self, id: ConnId, payload: &[u8]) -> Result<()> {
        let mut cur = Cursor::new(payload);
        let header = match SnacHeader::decode(&mut cur) {
            Ok(header) => header,
            Err(e) => {
                warn!(conn = %id, error = %e, "unreadable snac header");
                self.teardown(id);
                return Err(e.into());
            }
        };
        let body = match strip_version_block(&header, cur.rest()) {
            Ok(body) => body,
            Err(e) => {
                warn!(conn = %id, error = %e, "unreadable snac version block");
                self.teardown(id);
                return Err(e.into());
            }
        };
        trace!(
            conn = %id,
            family = header.family,
            subtype = header.subtype,
            request_id = header.request_id,
            "snac in"
        );

        let pending = if header.request_id != 0 {
            self.pending.take(header.request_id)
        } else {
            None
        };
        let handler = self
            .connections
            .get(&id)
            .and_then(|c| c.handlers.get(&header.key()).copied());
        match handler {
            Some(handler) => handler(self, id, &header, pending, body),
            None => {
                debug!(
                    conn = %id,
                    family = header.family,
                    subtype = header.subtype,
                    "no handler; dropping"
                );
                Ok(())
            }
        }
    }

    /// A channel-4 frame: the server is closing this connection, optionally
    /// saying why.
    fn handle_close_frame(&mut self, id: ConnId, payload: &[u8]) -> Result<()> {
        let mut code = None;
        let mut message = None;
        if !payload.is_empty() {
            match Chain::decode(payload) {
                Ok(chain) => {
                    code = chain.first(ATTR_CLOSE_CODE).and_then(Attribute::value_u16);
                    message = chain
                        .first(ATTR_CLOSE_MESSAGE)
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                }
                Err(e) => debug!(conn = %id, error = %e, "unreadable close notice"),
            }
        }
        warn!(
            conn = %id,
            ?code,
            message = message.as_deref().unwrap_or(""),
            "server closed connection"
        );
        self.events.push_back(SessionEvent::CloseNotice {
            conn: id,
            code,
            message,
        });
        self.teardown(id);
        Ok(())
    }

    // ---- sending ----

    /// Headers a SNAC body and sends it as a data frame.
    ///
    /// Every send gets a fresh request id; passing a context registers a
    /// pending request under that id so the correlated reply finds its way
    /// back. Returns the id.
    pub fn send_snac(
        &mut self,
        id: ConnId,
        family: u16,
        subtype: u16,
        flags: u16,
        body: &[u8],
        context: Option<RequestContext>,
    ) -> Result<u32> {
        let request_id = self.pending.allocate();
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(SessionError::UnknownConnection(id))?;

        let header = SnacHeader::new(family, subtype, flags, request_id);
        let mut payload = BytesMut::with_capacity(SNAC_HEADER_LEN + body.len());
        header.encode_into(&mut payload);
        payload.extend_from_slice(body);
        conn.write_frame(CHANNEL_DATA, &payload)?;
        trace!(conn = %id, family, subtype, request_id, "snac out");

        if let Some(context) = context {
            self.pending.insert(PendingRequest {
                request_id,
                conn: id,
                family,
                subtype,
                context,
                issued_at: Instant::now(),
            });
        }
        Ok(request_id)
    }

    /// Sends an empty keepalive frame. The cadence belongs to the embedding
    /// gateway's timer, not this layer.
    pub fn send_keepalive(&mut self, id: ConnId) -> Result<()> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(SessionError::UnknownConnection(id))?;
        conn.write_frame(CHANNEL_KEEPALIVE, &[])
    }

    /// Registers a handler for `(family, subtype)` on one connection,
    /// replacing any previous one.
    ///
    /// The generic-service and buddy-list handlers are installed when a
    /// connection opens; the embedding gateway adds its own families
    /// (login, messaging, chat) here.
    pub fn register_handler(
        &mut self,
        id: ConnId,
        family: u16,
        subtype: u16,
        handler: Handler<D>,
    ) -> Result<()> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(SessionError::UnknownConnection(id))?;
        conn.handlers.insert((family, subtype), handler);
        Ok(())
    }

    /// Asks the BOS connection for a service connection. The redirect that
    /// answers is followed automatically; watch for
    /// [`SessionEvent::Redirected`].
    pub fn request_service(&mut self, service: u16) -> Result<u32> {
        let conn = self.bos_conn()?;
        self.send_snac(
            conn,
            FAMILY_GENERIC,
            GENERIC_SERVICE_REQUEST,
            0,
            &service.to_be_bytes(),
            Some(RequestContext::ServiceRequest { service }),
        )
    }

    fn bos_conn(&self) -> Result<ConnId> {
        self.connections
            .values()
            .find(|c| c.kind == ConnKind::Bos)
            .map(|c| c.id)
            .ok_or(SessionError::NoConnection(ConnKind::Bos))
    }

    // ---- built-in handlers ----

    /// First SNAC on a freshly authenticated connection: the families the
    /// server will carry here.
    fn handle_host_online(
        &mut self,
        id: ConnId,
        _header: &SnacHeader,
        _pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        let mut cur = Cursor::new(body);
        let mut families = Vec::with_capacity(body.len() / 2);
        while !cur.is_empty() {
            families.push(cur.read_u16()?);
        }
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(SessionError::UnknownConnection(id))?;
        conn.allowed_families = families;
        conn.state = ConnState::Ready;
        let kind = conn.kind;
        info!(conn = %id, ?kind, families = conn.allowed_families.len(), "connection ready");
        self.events.push_back(SessionEvent::Ready { conn: id, kind });
        Ok(())
    }

    /// Follows a service redirect by dialing the announced host with the
    /// new cookie. A redirect missing any of its three attributes is
    /// dropped.
    fn handle_redirect(
        &mut self,
        id: ConnId,
        _header: &SnacHeader,
        pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        let chain = Chain::decode(body)?;
        let service = chain.first(ATTR_SERVICE_ID).and_then(Attribute::value_u16);
        let host = chain
            .first(ATTR_HOST)
            .map(|a| String::from_utf8_lossy(&a.value).into_owned());
        let cookie = chain.first(ATTR_COOKIE).map(|a| a.value.clone());
        let (Some(service), Some(host), Some(cookie)) = (service, host, cookie) else {
            warn!(conn = %id, "redirect missing service, host or cookie; dropping");
            return Ok(());
        };
        let Some(kind) = ConnKind::from_service_id(service) else {
            warn!(conn = %id, service, "redirect to unknown service; dropping");
            return Ok(());
        };
        if let Some(pending) = &pending {
            if let RequestContext::ServiceRequest { service: asked } = pending.context {
                if asked != service {
                    debug!(conn = %id, asked, got = service, "redirect service differs from request");
                }
            }
        }

        let (host, port) = split_host_port(&host, self.config.login_port);
        let new_id = self.connect_service(kind, &host, port, cookie)?;
        info!(conn = %id, service, host = %host, port, new_conn = %new_id, "redirected");
        self.events.push_back(SessionEvent::Redirected {
            service,
            conn: new_id,
        });
        Ok(())
    }

    fn handle_ssi_rights(
        &mut self,
        id: ConnId,
        _header: &SnacHeader,
        _pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        self.ssi.handle_rights(body)?;
        self.flush_ssi(id)
    }

    fn handle_ssi_list(
        &mut self,
        id: ConnId,
        header: &SnacHeader,
        _pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        let more_following = header.flags & FLAG_MORE_FOLLOWING != 0;
        self.ssi.handle_list(body, more_following)?;
        self.flush_ssi(id)
    }

    fn handle_ssi_list_unchanged(
        &mut self,
        id: ConnId,
        _header: &SnacHeader,
        _pending: Option<PendingRequest>,
        _body: &[u8],
    ) -> Result<()> {
        self.ssi.handle_list_unchanged();
        self.flush_ssi(id)
    }

    fn handle_ssi_ack(
        &mut self,
        id: ConnId,
        header: &SnacHeader,
        pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        if pending.is_none() {
            debug!(conn = %id, request_id = header.request_id, "ack with no pending request");
        }
        self.ssi.handle_ack(header.request_id, body)?;
        self.flush_ssi(id)
    }

    fn handle_ssi_auth_requested(
        &mut self,
        id: ConnId,
        _header: &SnacHeader,
        _pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        self.ssi.handle_auth_request(body)?;
        self.flush_ssi(id)
    }

    fn handle_ssi_auth_replied(
        &mut self,
        id: ConnId,
        _header: &SnacHeader,
        _pending: Option<PendingRequest>,
        body: &[u8],
    ) -> Result<()> {
        self.ssi.handle_auth_reply(body)?;
        self.flush_ssi(id)
    }

    /// Sends whatever the buddy-list engine has prepared and surfaces its
    /// events. Mutations report their assigned request id back so the
    /// engine can recognize the ack.
    fn flush_ssi(&mut self, conn: ConnId) -> Result<()> {
        while let Some(out) = self.ssi.next_outbound() {
            let context = match out.kind {
                OutboundKind::Mutation => Some(RequestContext::SsiMutation),
                OutboundKind::Query => Some(RequestContext::SsiQuery),
                OutboundKind::Control => None,
            };
            let request_id = self.send_snac(conn, FAMILY_SSI, out.subtype, 0, &out.body, context)?;
            if out.kind == OutboundKind::Mutation {
                self.ssi.mutation_sent(request_id);
            }
        }
        while let Some(event) = self.ssi.next_event() {
            self.events.push_back(SessionEvent::Ssi(event));
        }
        Ok(())
    }

    // ---- buddy-list operations, carried by the BOS connection ----

    /// Asks for the per-kind item limits.
    pub fn ssi_request_rights(&mut self) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.request_rights();
        self.flush_ssi(conn)
    }

    /// Starts a fresh full fetch of the server-stored list.
    pub fn ssi_request_full_list(&mut self) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.request_full_list();
        self.flush_ssi(conn)
    }

    /// Puts the stored list into effect server-side. Send once the fetch
    /// has landed.
    pub fn ssi_activate(&mut self) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.activate();
        self.flush_ssi(conn)
    }

    /// Adds a buddy, creating the group first when needed.
    pub fn ssi_add_buddy(&mut self, group: &str, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.add_buddy(group, handle)?;
        self.flush_ssi(conn)
    }

    /// Adds a buddy flagged as awaiting the contact's authorization.
    pub fn ssi_add_buddy_awaiting_auth(&mut self, group: &str, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.add_buddy_awaiting_auth(group, handle)?;
        self.flush_ssi(conn)
    }

    /// Removes a buddy; an emptied group is deleted behind it.
    pub fn ssi_remove_buddy(&mut self, group: &str, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.remove_buddy(group, handle)?;
        self.flush_ssi(conn)
    }

    /// Moves a buddy between groups.
    pub fn ssi_move_buddy(&mut self, old_group: &str, new_group: &str, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.move_buddy(old_group, new_group, handle)?;
        self.flush_ssi(conn)
    }

    /// Puts a screen name on the permit list.
    pub fn ssi_add_permit(&mut self, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.add_permit(handle)?;
        self.flush_ssi(conn)
    }

    /// Puts a screen name on the deny list.
    pub fn ssi_add_deny(&mut self, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.add_deny(handle)?;
        self.flush_ssi(conn)
    }

    pub fn ssi_remove_permit(&mut self, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.remove_permit(handle)?;
        self.flush_ssi(conn)
    }

    pub fn ssi_remove_deny(&mut self, handle: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.remove_deny(handle)?;
        self.flush_ssi(conn)
    }

    /// Stores the privacy mode and visible-class mask.
    pub fn ssi_set_privacy(&mut self, mode: PrivacyMode, class_mask: u32) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.set_privacy(mode, class_mask)?;
        self.flush_ssi(conn)
    }

    /// Asks a contact for permission to add them.
    pub fn ssi_request_authorization(&mut self, handle: &str, reason: &str) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.request_authorization(handle, reason)?;
        self.flush_ssi(conn)
    }

    /// Grants or denies another user's request to add this account.
    pub fn ssi_reply_authorization(
        &mut self,
        handle: &str,
        accept: bool,
        reason: &str,
    ) -> Result<()> {
        let conn = self.bos_conn()?;
        self.ssi.reply_authorization(handle, accept, reason)?;
        self.flush_ssi(conn)
    }
}

/// Installs the handlers every connection of this kind starts with. The
/// authorizer speaks only the caller's login protocol, so it gets none.
fn install_default_handlers<D: Dialer>(conn: &mut Connection<D>) {
    if conn.kind == ConnKind::Auth {
        return;
    }
    conn.handlers.insert(
        (FAMILY_GENERIC, GENERIC_HOST_ONLINE),
        Session::<D>::handle_host_online as Handler<D>,
    );
    conn.handlers.insert(
        (FAMILY_GENERIC, GENERIC_SERVICE_REDIRECT),
        Session::<D>::handle_redirect as Handler<D>,
    );
    if conn.kind == ConnKind::Bos {
        conn.handlers.insert(
            (FAMILY_SSI, SSI_RIGHTS),
            Session::<D>::handle_ssi_rights as Handler<D>,
        );
        conn.handlers.insert(
            (FAMILY_SSI, SSI_LIST),
            Session::<D>::handle_ssi_list as Handler<D>,
        );
        conn.handlers.insert(
            (FAMILY_SSI, SSI_LIST_UNCHANGED),
            Session::<D>::handle_ssi_list_unchanged as Handler<D>,
        );
        conn.handlers.insert(
            (FAMILY_SSI, SSI_ACK),
            Session::<D>::handle_ssi_ack as Handler<D>,
        );
        conn.handlers.insert(
            (FAMILY_SSI, SSI_AUTH_REQUESTED),
            Session::<D>::handle_ssi_auth_requested as Handler<D>,
        );
        conn.handlers.insert(
            (FAMILY_SSI, SSI_AUTH_REPLIED),
            Session::<D>::handle_ssi_auth_replied as Handler<D>,
        );
    }
}

/// Splits a redirect's `host` or `host:port` string; a missing or
/// unparseable port falls back to `default_port`.
fn split_host_port(s: &str, default_port: u16) -> (String, u16) {
    match s.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (s.to_string(), default_port),
        },
        None => (s.to_string(), default_port),
    }
}
