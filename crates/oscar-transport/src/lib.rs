//! TCP transport for OSCAR connections.
//!
//! OSCAR sessions hold several TCP connections at once (authorizer, BOS,
//! chat navigation, chat rooms). This crate provides the [`Dialer`] seam
//! the session layer uses to open them, plus the real [`TcpDialer`]
//! implementation over `std::net`. Streams are handed over in non-blocking
//! mode so the session can pump all its connections from one thread.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{TcpDialer, TcpLink};
pub use traits::Dialer;
