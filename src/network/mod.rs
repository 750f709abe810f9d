//! Byte-stream transport abstraction.
//!
//! The session layer only ever talks to a transport through these traits, so
//! the same MQTT logic runs over a `std` TCP socket, an embedded TCP/IP stack,
//! or a scripted mock in tests.
//!
//! # Receive semantics
//!
//! [`Read::read`] returning `Ok(0)` means "no data is available right now"
//! (for example the socket's receive timeout elapsed). It is not an
//! end-of-stream marker. A transport whose peer has closed the connection must
//! report it as an error, typically [`error::Error::ConnectionClosed`].

#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// Concrete transport implementations
pub mod client;

/// Application layer protocols built on top of the transport traits
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Shutdown, Write};
}

/// Receive side of a byte stream.
pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection.
    ///
    /// Returns `Ok(0)` when no data arrived within the transport's receive
    /// timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Send side of a byte stream.
pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Half-close of a byte stream.
pub trait Shutdown {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Signal the peer that no more data will be sent.
    ///
    /// Reads stay possible afterwards so that the caller can drain whatever
    /// the peer still sends before it closes its side.
    fn shutdown(&mut self) -> Result<(), Self::Error>;
}

/// Release of a byte stream.
pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Shutdown + Close {}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to `host:port`.
    ///
    /// A failed attempt must not leak the resources it allocated.
    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Connection, Self::Error>;
}
