use std::io::{Read, Write};

use crate::error::Result;

/// Opens byte streams to OSCAR hosts.
///
/// A session dials the authorizer first and then whatever hosts the server
/// redirects it to. Putting the dial behind a trait lets tests drive a
/// session with scripted in-memory streams instead of real sockets.
pub trait Dialer {
    /// Stream type produced by a successful dial.
    type Stream: Read + Write;

    /// Opens a stream to `host:port`.
    ///
    /// The returned stream must be in non-blocking mode: the session reads
    /// each connection until `WouldBlock` on every pump and must never stall
    /// on one connection while others have traffic.
    fn dial(&mut self, host: &str, port: u16) -> Result<Self::Stream>;
}
