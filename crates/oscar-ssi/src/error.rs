use crate::item::ItemKind;

/// Errors that can occur in the SSI engine.
#[derive(Debug, thiserror::Error)]
pub enum SsiError {
    /// A wire structure inside an SSI payload was malformed.
    #[error(transparent)]
    Wire(#[from] oscar_wire::WireError),

    /// An item name on the wire is not valid UTF-8.
    #[error("item name is not valid utf-8")]
    NameNotUtf8,

    /// The named group does not exist in the local mirror.
    #[error("group {name:?} not found")]
    GroupNotFound { name: String },

    /// The named buddy does not exist in the given group.
    #[error("buddy {name:?} not found in group {group:?}")]
    BuddyNotFound { group: String, name: String },

    /// No item of the given kind with the given name exists.
    #[error("no {kind:?} item named {name:?}")]
    ItemNotFound { kind: ItemKind, name: String },

    /// An acknowledgment body must be a whole number of 16-bit status codes.
    #[error("ack body has odd length {len}")]
    OddAckBody { len: usize },

    /// A string field does not fit its length prefix on the wire.
    #[error("{what} too long ({len} bytes, max {max})")]
    FieldTooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, SsiError>;
