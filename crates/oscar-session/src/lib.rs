//! OSCAR session management: connections, dispatch, correlation.
//!
//! This crate ties the wire layer to a running session. A [`Session`]
//! owns a set of [`Connection`]s (authorizer, BOS, chat services), answers
//! the FLAP hello on each, routes inbound SNACs to per-connection handler
//! tables, and correlates replies to requests through a process-wide
//! [`PendingStore`]. The server-stored buddy list is driven through the
//! embedded [`oscar_ssi::SsiEngine`], with its traffic flushed onto the
//! BOS connection automatically.
//!
//! The design is deliberately synchronous and single-threaded: the
//! embedding gateway owns the event loop, watches the streams, and calls
//! [`Session::pump`] when one is readable. Everything worth reacting to
//! comes back as a [`SessionEvent`].

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod pending;
pub mod session;

pub use config::{SessionConfig, DEFAULT_LOGIN_HOST, DEFAULT_LOGIN_PORT};
pub use connection::{ConnId, ConnKind, ConnState, Connection, Handler};
pub use error::{Result, SessionError};
pub use events::SessionEvent;
pub use pending::{PendingRequest, PendingStore, RequestContext};
pub use session::{
    Session, FAMILY_GENERIC, GENERIC_HOST_ONLINE, GENERIC_SERVICE_REDIRECT,
    GENERIC_SERVICE_REQUEST,
};
