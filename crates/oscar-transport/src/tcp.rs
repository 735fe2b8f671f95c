use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::Dialer;

/// A TCP connection to an OSCAR host.
///
/// Thin wrapper over [`std::net::TcpStream`]. The socket is switched to
/// non-blocking mode once connected so a session can poll several
/// connections without stalling on any one of them.
#[derive(Debug)]
pub struct TcpLink {
    inner: TcpStream,
}

impl TcpLink {
    /// Connects to `host:port` and prepares the socket for polling.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).map_err(|e| TransportError::Connect {
            host: host.to_string(),
            port,
            source: e,
        })?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        debug!(host, port, "connected");
        Ok(Self { inner: stream })
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Dialer producing real TCP connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = TcpLink;

    fn dial(&mut self, host: &str, port: u16) -> Result<TcpLink> {
        TcpLink::connect(host, port)
    }
}
