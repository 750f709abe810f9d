//! One MQTT session over one transport.
//!
//! A [`Session`] owns the connected transport and a single `N`-byte buffer
//! that every outgoing packet is serialized into and every incoming packet is
//! read into. Requests are never pipelined: at most one SUBSCRIBE and one
//! UNSUBSCRIBE identifier are outstanding, and each is cleared by the
//! acknowledgement that echoes it.
//!
//! Incoming traffic is handled one packet at a time by
//! [`Session::process_next`], which reads a packet and routes it:
//!
//! | Packet | Action |
//! |---|---|
//! | PUBLISH | decoded and handed to the [`PublishHandler`] |
//! | SUBACK | return codes applied to the [`TopicTable`], identifier checked |
//! | UNSUBACK | identifier checked |
//! | PINGRESP | nothing to correlate |
//! | anything else | logged and ignored |

use rand::RngCore;

use super::codec::{
    self, Ack, CodecError, ConnectInfo, DISCONNECT_PACKET_SIZE, FixedHeader, PINGREQ_PACKET_SIZE,
    PacketType, PublishInfo, SubscribeInfo,
};
use super::config::DEFAULT_BUFFER_SIZE;
use super::connection::graceful_close;
use super::error::{RetryOperation, SessionError};
use super::handler::PublishHandler;
use super::packet_id::PacketIdAllocator;
use super::subscription::TopicTable;
use crate::network::{Connection, Read, Write};
use crate::retry::{Delay, RetryConfig, RetryState, RetryStatus};

/// Identifiers of the requests awaiting an acknowledgement.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequests {
    /// Identifier of the outstanding SUBSCRIBE.
    pub subscribe: Option<u16>,
    /// Identifier of the outstanding UNSUBSCRIBE.
    pub unsubscribe: Option<u16>,
}

/// A received packet whose body lives in the session buffer.
///
/// The borrow ends before the next receive can overwrite the buffer.
#[derive(Debug, Clone, Copy)]
pub struct IncomingPacket<'b> {
    /// Decoded fixed header.
    pub header: FixedHeader,
    /// The `remaining_length` bytes following the fixed header.
    pub body: &'b [u8],
}

/// What [`Session::process_next`] did with the packet it read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Nothing arrived within the transport's receive timeout.
    NoData,
    /// A PUBLISH was handed to the publish handler.
    Publish,
    /// A SUBACK matching the pending SUBSCRIBE was applied.
    SubAck,
    /// An UNSUBACK matching the pending UNSUBSCRIBE arrived.
    UnsubAck,
    /// A PINGRESP arrived.
    PingResp,
    /// A well-formed packet this session has no use for was ignored.
    Unexpected(PacketType),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Dispatched {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Dispatched::NoData => defmt::write!(f, "NoData"),
            Dispatched::Publish => defmt::write!(f, "Publish"),
            Dispatched::SubAck => defmt::write!(f, "SubAck"),
            Dispatched::UnsubAck => defmt::write!(f, "UnsubAck"),
            Dispatched::PingResp => defmt::write!(f, "PingResp"),
            Dispatched::Unexpected(t) => defmt::write!(f, "Unexpected({})", t),
        }
    }
}

/// Sequential MQTT session over a connected transport.
pub struct Session<C: Connection, const N: usize = DEFAULT_BUFFER_SIZE> {
    transport: Option<C>,
    buffer: [u8; N],
    pending: PendingRequests,
    ack_poll_limit: u32,
}

impl<C: Connection, const N: usize> core::fmt::Debug for Session<C, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.transport.is_some())
            .field("capacity", &N)
            .field("pending", &self.pending)
            .field("ack_poll_limit", &self.ack_poll_limit)
            .finish()
    }
}

impl<C: Connection, const N: usize> Session<C, N> {
    /// Take ownership of a connected transport.
    ///
    /// While waiting for an acknowledgement the session tolerates
    /// `ack_poll_limit` consecutive receives that return no data.
    pub fn new(transport: C, ack_poll_limit: u32) -> Self {
        Self {
            transport: Some(transport),
            buffer: [0; N],
            pending: PendingRequests::default(),
            ack_poll_limit,
        }
    }

    /// Whether the session still holds its transport.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Requests awaiting an acknowledgement.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Send CONNECT and wait for the CONNACK.
    ///
    /// Returns the CONNACK's session-present flag. Any packet other than
    /// CONNACK, a refused connection, or no answer within the poll limit ends
    /// the session.
    pub fn connect(&mut self, info: &ConnectInfo<'_>) -> Result<bool, SessionError> {
        let size = codec::connect_packet_size(info)?;
        self.check_capacity(size.packet_size)?;
        let len = codec::serialize_connect(info, &mut self.buffer)?;
        send(&mut self.transport, &self.buffer[..len])?;
        debug!("CONNECT sent for client {}.", info.client_id);

        let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
        for _ in 0..self.ack_poll_limit {
            let Some(packet) = read_packet(transport, &mut self.buffer)? else {
                continue;
            };
            if packet.header.packet_type != PacketType::ConnAck {
                error!(
                    "Expected CONNACK, received {:?}.",
                    packet.header.packet_type
                );
                return Err(SessionError::UnexpectedPacket(packet.header.packet_type));
            }
            return match codec::deserialize_ack(&packet.header, packet.body)? {
                Ack::ConnAck {
                    session_present,
                    return_code: 0,
                } => {
                    info!("CONNACK received, session present: {}.", session_present);
                    Ok(session_present)
                }
                Ack::ConnAck { return_code, .. } => {
                    error!("Broker refused the connection with code {}.", return_code);
                    Err(SessionError::ConnectionRefused(return_code))
                }
                _ => Err(SessionError::UnexpectedPacket(packet.header.packet_type)),
            };
        }

        error!("No CONNACK within {} polls.", self.ack_poll_limit);
        Err(SessionError::AckTimeout)
    }

    /// Read one packet, if any, and route it.
    pub fn process_next<const T: usize, H>(
        &mut self,
        topics: &mut TopicTable<'_, T>,
        handler: &mut H,
    ) -> Result<Dispatched, SessionError>
    where
        H: PublishHandler + ?Sized,
    {
        let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
        let Some(packet) = read_packet(transport, &mut self.buffer)? else {
            return Ok(Dispatched::NoData);
        };
        dispatch(packet, &mut self.pending, topics, handler)
    }

    /// Subscribe to every filter of `topics`, retrying until all are accepted.
    ///
    /// Each round sends a SUBSCRIBE with a fresh identifier and processes
    /// incoming packets until the SUBACK arrives. A round fails when any
    /// filter is rejected or when no SUBACK shows up within the poll limit;
    /// failed rounds are retried after a backoff until `retry.max_attempts`
    /// rounds have been made.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe_with_retry<const T: usize, D, R, H>(
        &mut self,
        topics: &mut TopicTable<'_, T>,
        packet_ids: &mut PacketIdAllocator,
        retry: RetryConfig,
        delay: &mut D,
        rng: &mut R,
        handler: &mut H,
    ) -> Result<(), SessionError>
    where
        D: Delay + ?Sized,
        R: RngCore + ?Sized,
        H: PublishHandler + ?Sized,
    {
        let mut state = RetryState::new(retry);
        loop {
            topics.reset_statuses();
            let packet_id = packet_ids.next();
            self.send_subscription(PacketType::Subscribe, topics.requests(), packet_id)?;
            self.pending.subscribe = Some(packet_id);
            info!(
                "SUBSCRIBE sent for {} topic filter(s) with packet id {}.",
                topics.len(),
                packet_id
            );

            if self.await_ack(Dispatched::SubAck, topics, handler)? {
                if topics.all_accepted() {
                    info!("Broker accepted every topic filter.");
                    return Ok(());
                }
                warn!("Broker rejected at least one topic filter.");
            }

            if state.backoff_and_sleep(delay, rng) == RetryStatus::RetriesExhausted {
                error!(
                    "Subscription failed after {} attempts.",
                    state.attempts_done()
                );
                self.pending.subscribe = None;
                return Err(SessionError::RetriesExhausted(RetryOperation::Subscribe));
            }
        }
    }

    /// Unsubscribe from every filter of `topics`.
    ///
    /// Succeeds once the matching UNSUBACK arrives; rounds without one are
    /// retried like [`Session::subscribe_with_retry`] rounds.
    #[allow(clippy::too_many_arguments)]
    pub fn unsubscribe_with_retry<const T: usize, D, R, H>(
        &mut self,
        topics: &mut TopicTable<'_, T>,
        packet_ids: &mut PacketIdAllocator,
        retry: RetryConfig,
        delay: &mut D,
        rng: &mut R,
        handler: &mut H,
    ) -> Result<(), SessionError>
    where
        D: Delay + ?Sized,
        R: RngCore + ?Sized,
        H: PublishHandler + ?Sized,
    {
        let mut state = RetryState::new(retry);
        loop {
            let packet_id = packet_ids.next();
            self.send_subscription(PacketType::Unsubscribe, topics.requests(), packet_id)?;
            self.pending.unsubscribe = Some(packet_id);
            info!("UNSUBSCRIBE sent with packet id {}.", packet_id);

            if self.await_ack(Dispatched::UnsubAck, topics, handler)? {
                info!("UNSUBACK received.");
                return Ok(());
            }

            if state.backoff_and_sleep(delay, rng) == RetryStatus::RetriesExhausted {
                error!(
                    "Unsubscribe failed after {} attempts.",
                    state.attempts_done()
                );
                self.pending.unsubscribe = None;
                return Err(SessionError::RetriesExhausted(RetryOperation::Unsubscribe));
            }
        }
    }

    /// Send a PUBLISH.
    ///
    /// Only the header goes through the session buffer; the payload is
    /// written straight from `publish`. The whole packet must still fit the
    /// buffer so that the broker's echo of it can be received. `packet_id` is
    /// ignored for QoS 0.
    pub fn publish(&mut self, publish: &PublishInfo<'_>, packet_id: u16) -> Result<(), SessionError> {
        let size = codec::publish_packet_size(publish)?;
        self.check_capacity(size.packet_size)?;
        let len = codec::serialize_publish_header(publish, packet_id, &mut self.buffer)?;
        send(&mut self.transport, &self.buffer[..len])?;
        if !publish.payload.is_empty() {
            send(&mut self.transport, publish.payload)?;
        }
        debug!(
            "PUBLISH sent to {} with {} payload bytes.",
            publish.topic_name,
            publish.payload.len()
        );
        Ok(())
    }

    /// Send a PINGREQ.
    pub fn ping(&mut self) -> Result<(), SessionError> {
        self.check_capacity(PINGREQ_PACKET_SIZE)?;
        let len = codec::serialize_pingreq(&mut self.buffer)?;
        send(&mut self.transport, &self.buffer[..len])?;
        debug!("PINGREQ sent.");
        Ok(())
    }

    /// Send a DISCONNECT. The broker does not answer it.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.check_capacity(DISCONNECT_PACKET_SIZE)?;
        let len = codec::serialize_disconnect(&mut self.buffer)?;
        send(&mut self.transport, &self.buffer[..len])?;
        info!("DISCONNECT sent.");
        Ok(())
    }

    /// Release the transport with [`graceful_close`].
    pub fn close<D: Delay + ?Sized>(&mut self, delay: &mut D, max_loops: u32, poll_delay_ms: u32) {
        self.pending = PendingRequests::default();
        graceful_close(&mut self.transport, delay, max_loops, poll_delay_ms);
    }

    fn send_subscription(
        &mut self,
        kind: PacketType,
        requests: &[SubscribeInfo<'_>],
        packet_id: u16,
    ) -> Result<(), SessionError> {
        let size = match kind {
            PacketType::Unsubscribe => codec::unsubscribe_packet_size(requests)?,
            _ => codec::subscribe_packet_size(requests)?,
        };
        self.check_capacity(size.packet_size)?;
        let len = match kind {
            PacketType::Unsubscribe => {
                codec::serialize_unsubscribe(requests, packet_id, &mut self.buffer)?
            }
            _ => codec::serialize_subscribe(requests, packet_id, &mut self.buffer)?,
        };
        send(&mut self.transport, &self.buffer[..len])
    }

    /// Process packets until `wanted` is dispatched or the poll limit of
    /// consecutive empty receives is reached.
    fn await_ack<const T: usize, H>(
        &mut self,
        wanted: Dispatched,
        topics: &mut TopicTable<'_, T>,
        handler: &mut H,
    ) -> Result<bool, SessionError>
    where
        H: PublishHandler + ?Sized,
    {
        let mut idle_polls = 0;
        while idle_polls < self.ack_poll_limit {
            match self.process_next(topics, handler)? {
                dispatched if dispatched == wanted => return Ok(true),
                Dispatched::NoData => idle_polls += 1,
                _ => idle_polls = 0,
            }
        }
        warn!("Gave up waiting for {:?} after {} empty polls.", wanted, idle_polls);
        Ok(false)
    }

    fn check_capacity(&self, required: usize) -> Result<(), SessionError> {
        if required > N {
            error!(
                "Packet of {} bytes does not fit the {} byte buffer.",
                required,
                N
            );
            return Err(SessionError::BufferTooSmall {
                required,
                capacity: N,
            });
        }
        Ok(())
    }
}

fn send<C: Write>(transport: &mut Option<C>, bytes: &[u8]) -> Result<(), SessionError> {
    let transport = transport.as_mut().ok_or(SessionError::NotConnected)?;
    let sent = transport
        .write(bytes)
        .map_err(|_| SessionError::SendFailed)?;
    if sent != bytes.len() {
        error!("Transport sent {} of {} bytes.", sent, bytes.len());
        return Err(SessionError::PartialSend {
            sent,
            expected: bytes.len(),
        });
    }
    transport.flush().map_err(|_| SessionError::SendFailed)
}

fn read_packet<'b, C>(
    transport: &mut C,
    buffer: &'b mut [u8],
) -> Result<Option<IncomingPacket<'b>>, SessionError>
where
    C: Read + ?Sized,
{
    let header = match codec::read_packet_header(transport) {
        Ok(Some(header)) => header,
        Ok(None) => return Ok(None),
        Err(CodecError::ReceiveFailed) => return Err(SessionError::ReceiveFailed),
        Err(e) => return Err(e.into()),
    };

    let len = header.remaining_length;
    if len > buffer.len() {
        error!(
            "Incoming packet of {} bytes does not fit the {} byte buffer.",
            len,
            buffer.len()
        );
        return Err(SessionError::BufferTooSmall {
            required: len,
            capacity: buffer.len(),
        });
    }

    let body = &mut buffer[..len];
    let mut filled = 0;
    while filled < len {
        match transport.read(&mut body[filled..]) {
            Ok(0) => return Err(SessionError::TruncatedPacket),
            Ok(n) => filled += n,
            Err(_) => return Err(SessionError::ReceiveFailed),
        }
    }
    trace!("Received {:?} with {} body bytes.", header.packet_type, len);

    Ok(Some(IncomingPacket { header, body }))
}

fn dispatch<const T: usize, H>(
    packet: IncomingPacket<'_>,
    pending: &mut PendingRequests,
    topics: &mut TopicTable<'_, T>,
    handler: &mut H,
) -> Result<Dispatched, SessionError>
where
    H: PublishHandler + ?Sized,
{
    let packet_type = packet.header.packet_type;

    if let PacketType::Publish { .. } = packet_type {
        let (packet_id, publish) = codec::deserialize_publish(&packet.header, packet.body)?;
        let subscribed = topics.matches(publish.topic_name);
        handler.on_publish(packet_id, &publish, subscribed);
        return Ok(Dispatched::Publish);
    }

    if !packet_type.is_ack() {
        warn!("Ignoring unexpected {:?} packet.", packet_type);
        return Ok(Dispatched::Unexpected(packet_type));
    }

    match codec::deserialize_ack(&packet.header, packet.body)? {
        Ack::SubAck {
            packet_id,
            return_codes,
        } => {
            correlate(&mut pending.subscribe, packet_id)?;
            topics.apply_suback(return_codes)?;
            Ok(Dispatched::SubAck)
        }
        Ack::UnsubAck { packet_id } => {
            correlate(&mut pending.unsubscribe, packet_id)?;
            Ok(Dispatched::UnsubAck)
        }
        Ack::PingResp => {
            debug!("PINGRESP received.");
            Ok(Dispatched::PingResp)
        }
        Ack::ConnAck { .. } | Ack::Publish { .. } => {
            warn!("Ignoring unexpected {:?} packet.", packet_type);
            Ok(Dispatched::Unexpected(packet_type))
        }
    }
}

/// Match an acknowledgement against the outstanding request and clear it.
fn correlate(pending: &mut Option<u16>, received: u16) -> Result<(), SessionError> {
    match pending.take() {
        Some(expected) if expected == received => Ok(()),
        expected => {
            error!(
                "Acknowledgement for packet id {} while {:?} was pending.",
                received,
                expected
            );
            Err(SessionError::PacketIdMismatch {
                expected: expected.unwrap_or(0),
                received,
            })
        }
    }
}
