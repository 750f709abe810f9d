//! # Application Layer Network Protocols
//!
//! Application layer (OSI Layer 7) protocols built on the transport traits
//! of [`crate::network`].
//!
//! ## Design Principles
//!
//! - **Connection Agnostic**: Work with any type implementing [`Connection`](crate::network::Connection)
//! - **No-std Compatible**: Designed for embedded systems without heap allocation
//! - **Resource Conscious**: Use fixed-size buffers and minimal memory
//! - **Error Handling**: Fatal conditions are returned as typed errors, never panics

/// MQTT session implementation.
///
/// Provides an MQTT 3.1.1 session loop for lightweight publish-subscribe
/// messaging, commonly used in IoT applications.
pub mod mqtt;
