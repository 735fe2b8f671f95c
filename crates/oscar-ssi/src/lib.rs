//! Server-Stored Information: the OSCAR server-side buddy list.
//!
//! AIM keeps the buddy list, permit/deny lists and privacy preferences on
//! the server as a flat collection of typed items. This crate maintains a
//! local mirror of that collection and drives every change to it through
//! the protocol's strict discipline: an edit window bracketed by start/stop
//! control messages, with exactly one add/modify/delete on the wire at a
//! time, each waiting for its acknowledgment.
//!
//! The centerpiece is [`SsiEngine`], which is deliberately free of any I/O:
//! it emits ready-to-send SNAC bodies through an outbox and consumes server
//! replies through `handle_*` methods, letting the session layer own all
//! sockets, request ids and framing.

pub mod engine;
pub mod error;
pub mod item;
pub mod list;
pub mod mutation;

pub use engine::{
    OutboundKind, OutboundSnac, SsiEngine, SsiEvent, ACK_AUTH_REQUIRED, ACK_OK, FAMILY_SSI,
    SSI_ACK, SSI_ACTIVATE, SSI_ADD, SSI_AUTH_REPLIED, SSI_AUTH_REPLY, SSI_AUTH_REQUEST,
    SSI_AUTH_REQUESTED, SSI_DELETE, SSI_EDIT_START, SSI_EDIT_STOP, SSI_LIST, SSI_LIST_UNCHANGED,
    SSI_MODIFY, SSI_REQUEST_LIST, SSI_REQUEST_RIGHTS, SSI_RIGHTS,
};
pub use error::{Result, SsiError};
pub use item::{
    ItemKind, PrivacyMode, SsiItem, ATTR_AWAITING_AUTH, ATTR_GROUP_MEMBERS, ATTR_PRIVACY_CLASSES,
    ATTR_PRIVACY_MODE,
};
pub use list::{name_eq, SsiList};
pub use mutation::{Mutation, MutationQueue};
