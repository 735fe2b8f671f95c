use crate::connection::{ConnId, ConnKind};

/// Errors that can occur driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A wire structure could not be encoded or decoded.
    #[error(transparent)]
    Wire(#[from] oscar_wire::WireError),

    /// Dialing or stream setup failed.
    #[error(transparent)]
    Transport(#[from] oscar_transport::TransportError),

    /// The buddy-list engine rejected an operation or payload.
    #[error(transparent)]
    Ssi(#[from] oscar_ssi::SsiError),

    /// I/O failure on a connection's stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The referenced connection does not exist (any more).
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),

    /// No open connection of the kind the operation needs.
    #[error("no {0:?} connection")]
    NoConnection(ConnKind),
}

pub type Result<T> = std::result::Result<T, SessionError>;
