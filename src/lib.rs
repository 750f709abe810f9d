//! # lwmqtt - lightweight MQTT sessions
//!
//! A small MQTT 3.1.1 client that drives one session at a time over any
//! byte-stream transport: connect, subscribe, publish with keep-alive,
//! unsubscribe, disconnect, and start over. It is designed for embedded
//! systems and supports `no_std` environments.
//!
//! ## Features
//!
//! - **Single shared buffer**: every packet is serialized into and received
//!   into one fixed-size buffer owned by the session
//! - **Backoff with jitter**: connecting and subscribing are retried with
//!   exponentially growing, randomized delays
//! - **SUBACK verification**: a subscription only succeeds once the broker
//!   accepted every topic filter
//! - **Transport agnostic**: anything implementing
//!   [`network::Connection`] works, a `std` TCP transport is included
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! lwmqtt = { version = "0.1.0", features = ["std", "log"] }
//! ```
//!
//! ### Host example
//!
//! ```rust,no_run
//! # #[cfg(feature = "std")]
//! # {
//! use lwmqtt::network::application::mqtt::{SessionConfig, SessionOrchestrator};
//! use lwmqtt::network::client::tcp::TcpConnector;
//! use lwmqtt::retry::StdDelay;
//! use rand::SeedableRng;
//! use rand::rngs::SmallRng;
//!
//! let config = SessionConfig::new("test.mosquitto.org", "lwmqtt-demo", "lwmqtt-demo/example/topic");
//! let mut orchestrator = SessionOrchestrator::new(
//!     TcpConnector::default(),
//!     StdDelay,
//!     SmallRng::seed_from_u64(0x5eed),
//!     config,
//! )
//! .unwrap();
//!
//! let fatal = orchestrator.run();
//! # }
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support and the TCP transport (default: disabled)
//! - `log`: Log through the `log` facade
//! - `defmt`: Enable defmt logging support for embedded debugging

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

#[macro_use]
mod fmt;

/// Network abstraction layer providing the transport traits and the MQTT
/// session built on top of them.
pub mod network;

/// Retry policy with exponential backoff and jitter.
pub mod retry;
