//! MQTT 3.1.1 client sessions for embedded systems.
//!
//! The module is layered bottom-up:
//!
//! - [`codec`] sizes, serializes and decodes packets in caller buffers.
//! - [`PacketIdAllocator`] hands out nonzero packet identifiers.
//! - [`TopicTable`] tracks the broker's verdict for every topic filter.
//! - [`Session`] owns one transport and one buffer and runs the request /
//!   acknowledgement exchanges, with [`Session::process_next`] dispatching
//!   every incoming packet.
//! - [`connect_with_retry`] and [`graceful_close`] acquire and release the
//!   transport.
//! - [`SessionOrchestrator`] strings all of it into a session loop that
//!   connects, subscribes, publishes, unsubscribes and disconnects forever.
//!
//! Only QoS 0 publishing is exercised; there is no retransmission and no
//! persistent session state.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lwmqtt::network::application::mqtt::{SessionConfig, SessionOrchestrator};
//! use lwmqtt::retry::Delay;
//! # use lwmqtt::network::{Close, Connect, Connection, Read, Shutdown, Write};
//! # struct Socket;
//! # impl Read for Socket {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl Write for Socket {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Shutdown for Socket {
//! #     type Error = ();
//! #     fn shutdown(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Close for Socket {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Connection for Socket {}
//! # struct Stack;
//! # impl Connect for Stack {
//! #     type Connection = Socket;
//! #     type Error = ();
//! #     fn connect(&mut self, _host: &str, _port: u16) -> Result<Socket, ()> { Ok(Socket) }
//! # }
//! # struct Timer;
//! # impl Delay for Timer { fn delay_ms(&mut self, _ms: u32) {} }
//! use rand::SeedableRng;
//! use rand::rngs::SmallRng;
//!
//! let config = SessionConfig::new("broker.local", "node-1", "node-1/example/topic");
//! let mut orchestrator =
//!     SessionOrchestrator::new(Stack, Timer, SmallRng::seed_from_u64(42), config).unwrap();
//!
//! let fatal = orchestrator.run();
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod keepalive;
pub mod orchestrator;
pub mod packet_id;
pub mod session;
pub mod subscription;

pub use codec::{ConnectInfo, PublishInfo, QoS, SubscribeInfo};
pub use config::{ConfigError, DEFAULT_BUFFER_SIZE, MAX_TOPIC_FILTERS, SessionConfig};
pub use connection::{connect_with_retry, graceful_close};
pub use error::{RetryOperation, SessionError};
pub use handler::{PublishHandler, TopicLogger};
pub use keepalive::KeepAliveController;
pub use orchestrator::{SessionOrchestrator, SessionState};
pub use packet_id::PacketIdAllocator;
pub use session::{Dispatched, IncomingPacket, PendingRequests, Session};
pub use subscription::{AckStatus, TopicSubscription, TopicTable, topic_matches_filter};
