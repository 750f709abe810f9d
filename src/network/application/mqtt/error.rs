//! Session-level error types.

use super::codec::{CodecError, PacketType};
use super::config::ConfigError;

/// Operations that are retried with backoff before giving up.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RetryOperation {
    /// Opening the transport to the broker.
    Connect,
    /// Getting every topic filter accepted.
    Subscribe,
    /// Getting the UNSUBSCRIBE acknowledged.
    Unsubscribe,
}

#[cfg(feature = "defmt")]
impl defmt::Format for RetryOperation {
    fn format(&self, f: defmt::Formatter) {
        match self {
            RetryOperation::Connect => defmt::write!(f, "Connect"),
            RetryOperation::Subscribe => defmt::write!(f, "Subscribe"),
            RetryOperation::Unsubscribe => defmt::write!(f, "Unsubscribe"),
        }
    }
}

/// Errors that end a session.
///
/// Everything here is fatal for the session that raised it: the transport is
/// released and the error is handed to the caller. Transient conditions (a
/// refused TCP connection, a rejected topic filter) never show up here
/// directly; they are retried and only surface as
/// [`SessionError::RetriesExhausted`] once the retry budget is spent.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SessionError {
    /// A packet could not be encoded or decoded.
    Codec(CodecError),
    /// The configuration was rejected before the session started.
    InvalidConfig(ConfigError),
    /// A packet does not fit the session buffer.
    BufferTooSmall {
        /// Bytes the packet needs.
        required: usize,
        /// Capacity of the session buffer.
        capacity: usize,
    },
    /// The transport accepted fewer bytes than were handed to it.
    PartialSend {
        /// Bytes the transport reported as sent.
        sent: usize,
        /// Bytes that should have been sent.
        expected: usize,
    },
    /// The transport failed while sending.
    SendFailed,
    /// The transport failed while receiving, or the peer closed it.
    ReceiveFailed,
    /// The transport ran dry in the middle of a packet.
    TruncatedPacket,
    /// An acknowledgement carried an identifier other than the pending one.
    PacketIdMismatch {
        /// Identifier of the pending request.
        expected: u16,
        /// Identifier found in the acknowledgement.
        received: u16,
    },
    /// A specific packet was required and a different one arrived.
    UnexpectedPacket(PacketType),
    /// The broker refused the CONNECT with the given return code.
    ConnectionRefused(u8),
    /// The SUBACK carried a different number of return codes than topics
    /// were requested.
    SubAckCountMismatch {
        /// Number of requested topic filters.
        expected: usize,
        /// Number of return codes received.
        received: usize,
    },
    /// No CONNACK arrived within the poll limit.
    AckTimeout,
    /// More topic filters were configured than the topic table can hold.
    TooManyTopics,
    /// A request was issued while no transport was open.
    NotConnected,
    /// A retried operation failed on every attempt.
    RetriesExhausted(RetryOperation),
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        SessionError::Codec(err)
    }
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::InvalidConfig(err)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SessionError::Codec(e) => defmt::write!(f, "Codec({})", e),
            SessionError::InvalidConfig(e) => defmt::write!(f, "InvalidConfig({})", e),
            SessionError::BufferTooSmall { required, capacity } => defmt::write!(
                f,
                "BufferTooSmall {{ required: {=usize}, capacity: {=usize} }}",
                required,
                capacity
            ),
            SessionError::PartialSend { sent, expected } => defmt::write!(
                f,
                "PartialSend {{ sent: {=usize}, expected: {=usize} }}",
                sent,
                expected
            ),
            SessionError::SendFailed => defmt::write!(f, "SendFailed"),
            SessionError::ReceiveFailed => defmt::write!(f, "ReceiveFailed"),
            SessionError::TruncatedPacket => defmt::write!(f, "TruncatedPacket"),
            SessionError::PacketIdMismatch { expected, received } => defmt::write!(
                f,
                "PacketIdMismatch {{ expected: {=u16}, received: {=u16} }}",
                expected,
                received
            ),
            SessionError::UnexpectedPacket(t) => defmt::write!(f, "UnexpectedPacket({})", t),
            SessionError::ConnectionRefused(code) => {
                defmt::write!(f, "ConnectionRefused({=u8})", code)
            }
            SessionError::SubAckCountMismatch { expected, received } => defmt::write!(
                f,
                "SubAckCountMismatch {{ expected: {=usize}, received: {=usize} }}",
                expected,
                received
            ),
            SessionError::AckTimeout => defmt::write!(f, "AckTimeout"),
            SessionError::TooManyTopics => defmt::write!(f, "TooManyTopics"),
            SessionError::NotConnected => defmt::write!(f, "NotConnected"),
            SessionError::RetriesExhausted(op) => defmt::write!(f, "RetriesExhausted({})", op),
        }
    }
}
