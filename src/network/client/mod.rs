//! Concrete transports.
//!
//! Only hosted targets get a built-in transport; embedded targets implement
//! the [`Connection`](crate::network::Connection) traits over their own
//! TCP/IP stack.

/// `std::net` TCP transport.
#[cfg(feature = "std")]
pub mod tcp;
