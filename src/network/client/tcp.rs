//! TCP transport over `std::net`.
//!
//! [`TcpConnector`] resolves the broker address and opens a socket with a
//! receive timeout, so that a read with no pending data returns `Ok(0)`
//! instead of blocking forever. An orderly close by the peer is reported as
//! [`Error::ConnectionClosed`].

use crate::network::error::Error;
use crate::network::{Close, Connect, Connection, Read, Shutdown, Write};
use std::io::{ErrorKind, Read as StdRead, Write as StdWrite};
use std::net::{Shutdown as NetShutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Receive timeout used by [`TcpConnector::default`].
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens [`TcpConnection`]s.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    read_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector whose sockets time out reads after `read_timeout`.
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Connection, Self::Error> {
        let address = (host, port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?
            .next()
            .ok_or(Error::InvalidAddress)?;

        let stream = TcpStream::connect(address).map_err(|_| Error::ConnectionRefused)?;
        // A socket that cannot be configured is dropped (and closed) here.
        stream
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|_| Error::NotOpen)?;
        stream.set_nodelay(true).map_err(|_| Error::NotOpen)?;

        Ok(TcpConnection { stream })
    }
}

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl TcpConnection {
    /// Wrap an already connected stream.
    ///
    /// The caller is responsible for configuring a read timeout; without one
    /// every read blocks until data arrives.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for TcpConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stream.read(buf) {
            Ok(0) if !buf.is_empty() => Err(Error::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => Ok(0),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                    Err(Error::ConnectionClosed)
                }
                _ => Err(Error::ReadError),
            },
        }
    }
}

impl Write for TcpConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream
            .write_all(buf)
            .map(|()| buf.len())
            .map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Shutdown for TcpConnection {
    type Error = Error;

    fn shutdown(&mut self) -> Result<(), Self::Error> {
        self.stream
            .shutdown(NetShutdown::Write)
            .map_err(|_| Error::NotOpen)
    }
}

impl Close for TcpConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(NetShutdown::Both) {
            // The peer may already have torn the connection down.
            Err(e) if e.kind() != ErrorKind::NotConnected => Err(Error::NotOpen),
            _ => Ok(()),
        }
    }
}

impl Connection for TcpConnection {}
