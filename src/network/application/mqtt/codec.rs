//! MQTT 3.1.1 packet encoding and decoding.
//!
//! Every function here works on caller-supplied buffers and never allocates.
//! Outgoing packets are sized with a `*_packet_size` function, checked against
//! the caller's buffer, then written with the matching `serialize_*`
//! function. Incoming packets are read in two steps: [`read_packet_header`]
//! pulls the fixed header off the transport, then the caller reads
//! `remaining_length` bytes and hands them to [`deserialize_ack`] or
//! [`deserialize_publish`].
//!
//! # Examples
//!
//! ```rust
//! use lwmqtt::network::application::mqtt::codec::{
//!     ConnectInfo, connect_packet_size, serialize_connect,
//! };
//!
//! let info = ConnectInfo {
//!     client_id: "sensor_node_1",
//!     keep_alive_seconds: 60,
//!     clean_session: true,
//! };
//!
//! let size = connect_packet_size(&info).unwrap();
//! let mut buf = [0u8; 64];
//! let written = serialize_connect(&info, &mut buf).unwrap();
//! assert_eq!(written, size.packet_size);
//! assert_eq!(buf[0], 0x10);
//! ```

use crate::network::Read;

// MQTT Control Packet types - these are the fixed header first byte values,
// including the flag bits MQTT 3.1.1 makes mandatory.
/// MQTT CONNECT packet type identifier.
pub const CONNECT: u8 = 0x10;
/// MQTT CONNACK packet type identifier.
pub const CONNACK: u8 = 0x20;
/// MQTT PUBLISH packet type identifier (flags cleared).
pub const PUBLISH: u8 = 0x30;
/// MQTT PUBACK packet type identifier.
pub const PUBACK: u8 = 0x40;
/// MQTT PUBREC packet type identifier.
pub const PUBREC: u8 = 0x50;
/// MQTT PUBREL packet type identifier.
pub const PUBREL: u8 = 0x62;
/// MQTT PUBCOMP packet type identifier.
pub const PUBCOMP: u8 = 0x70;
/// MQTT SUBSCRIBE packet type identifier.
pub const SUBSCRIBE: u8 = 0x82;
/// MQTT SUBACK packet type identifier.
pub const SUBACK: u8 = 0x90;
/// MQTT UNSUBSCRIBE packet type identifier.
pub const UNSUBSCRIBE: u8 = 0xA2;
/// MQTT UNSUBACK packet type identifier.
pub const UNSUBACK: u8 = 0xB0;
/// MQTT PINGREQ packet type identifier.
pub const PINGREQ: u8 = 0xC0;
/// MQTT PINGRESP packet type identifier.
pub const PINGRESP: u8 = 0xD0;
/// MQTT DISCONNECT packet type identifier.
pub const DISCONNECT: u8 = 0xE0;

/// Mask selecting the packet type nibble of a fixed header byte.
pub const PACKET_TYPE_MASK: u8 = 0xF0;

/// SUBACK return code signalling that the broker refused a topic filter.
pub const SUBACK_FAILURE: u8 = 0x80;

/// Size of a PINGREQ packet.
pub const PINGREQ_PACKET_SIZE: usize = 2;
/// Size of a DISCONNECT packet.
pub const DISCONNECT_PACKET_SIZE: usize = 2;

/// Largest value the variable-length remaining length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

// Protocol constants defined by MQTT 3.1.1 specification
/// MQTT protocol name.
const PROTOCOL_NAME: &[u8] = b"MQTT";
/// MQTT protocol level for version 3.1.1.
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1
/// Protocol name, level, connect flags and keep alive.
const CONNECT_VARIABLE_HEADER_SIZE: usize = 10;

/// Errors raised while encoding or decoding packets.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    /// The output buffer cannot hold the packet.
    BufferTooSmall,
    /// The packet is larger than the remaining length field can express.
    RemainingLengthTooLarge,
    /// The remaining length field is truncated or longer than four bytes.
    MalformedRemainingLength,
    /// The fixed header byte does not name a valid packet type.
    InvalidPacketType(u8),
    /// The packet body does not match the layout of its type.
    MalformedPacket,
    /// A packet identifier of zero was used or received.
    InvalidPacketId,
    /// A QoS value outside 0..=2 was used or received.
    InvalidQoS(u8),
    /// A topic name or filter is empty, not UTF-8 or misplaces wildcards.
    InvalidTopic,
    /// A string does not fit its 16-bit length prefix.
    StringTooLong,
    /// A SUBSCRIBE or UNSUBSCRIBE request named no topic filter.
    EmptySubscription,
    /// The transport failed while the fixed header was being read.
    ReceiveFailed,
}

#[cfg(feature = "defmt")]
impl defmt::Format for CodecError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            CodecError::BufferTooSmall => defmt::write!(f, "BufferTooSmall"),
            CodecError::RemainingLengthTooLarge => defmt::write!(f, "RemainingLengthTooLarge"),
            CodecError::MalformedRemainingLength => defmt::write!(f, "MalformedRemainingLength"),
            CodecError::InvalidPacketType(byte) => {
                defmt::write!(f, "InvalidPacketType({=u8:#04x})", byte)
            }
            CodecError::MalformedPacket => defmt::write!(f, "MalformedPacket"),
            CodecError::InvalidPacketId => defmt::write!(f, "InvalidPacketId"),
            CodecError::InvalidQoS(qos) => defmt::write!(f, "InvalidQoS({=u8})", qos),
            CodecError::InvalidTopic => defmt::write!(f, "InvalidTopic"),
            CodecError::StringTooLong => defmt::write!(f, "StringTooLong"),
            CodecError::EmptySubscription => defmt::write!(f, "EmptySubscription"),
            CodecError::ReceiveFailed => defmt::write!(f, "ReceiveFailed"),
        }
    }
}

/// Quality of Service levels for MQTT messages.
///
/// ```rust
/// use lwmqtt::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::try_from(1), Ok(QoS::AtLeastOnce));
/// assert!(QoS::try_from(3).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: At most once delivery.
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(CodecError::InvalidQoS(other)),
        }
    }
}

/// Decoded control packet type.
///
/// The PUBLISH family is recognised by its type nibble alone
/// (`byte & 0xF0 == 0x30`) because its low nibble carries the DUP, QoS and
/// RETAIN flags. Every other type must carry exactly the flag bits the
/// protocol reserves for it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    /// Client request to connect.
    Connect,
    /// Connection acknowledgement.
    ConnAck,
    /// Application message, with its fixed header flags.
    Publish {
        /// Redelivery flag.
        dup: bool,
        /// Delivery guarantee.
        qos: QoS,
        /// Retained message flag.
        retain: bool,
    },
    /// QoS 1 publish acknowledgement.
    PubAck,
    /// QoS 2 publish received.
    PubRec,
    /// QoS 2 publish release.
    PubRel,
    /// QoS 2 publish complete.
    PubComp,
    /// Subscribe request.
    Subscribe,
    /// Subscribe acknowledgement.
    SubAck,
    /// Unsubscribe request.
    Unsubscribe,
    /// Unsubscribe acknowledgement.
    UnsubAck,
    /// Keep-alive request.
    PingReq,
    /// Keep-alive response.
    PingResp,
    /// Client disconnect notification.
    Disconnect,
}

impl PacketType {
    /// Decode a fixed header byte.
    pub fn from_byte(byte: u8) -> Result<Self, CodecError> {
        if byte & PACKET_TYPE_MASK == PUBLISH {
            let qos = QoS::try_from((byte >> 1) & 0x03)?;
            return Ok(PacketType::Publish {
                dup: byte & 0x08 != 0,
                qos,
                retain: byte & 0x01 != 0,
            });
        }

        match byte {
            CONNECT => Ok(PacketType::Connect),
            CONNACK => Ok(PacketType::ConnAck),
            PUBACK => Ok(PacketType::PubAck),
            PUBREC => Ok(PacketType::PubRec),
            PUBREL => Ok(PacketType::PubRel),
            PUBCOMP => Ok(PacketType::PubComp),
            SUBSCRIBE => Ok(PacketType::Subscribe),
            SUBACK => Ok(PacketType::SubAck),
            UNSUBSCRIBE => Ok(PacketType::Unsubscribe),
            UNSUBACK => Ok(PacketType::UnsubAck),
            PINGREQ => Ok(PacketType::PingReq),
            PINGRESP => Ok(PacketType::PingResp),
            DISCONNECT => Ok(PacketType::Disconnect),
            other => Err(CodecError::InvalidPacketType(other)),
        }
    }

    /// Encode as a fixed header byte.
    pub fn to_byte(self) -> u8 {
        match self {
            PacketType::Connect => CONNECT,
            PacketType::ConnAck => CONNACK,
            PacketType::Publish { dup, qos, retain } => {
                let mut byte = PUBLISH | ((qos as u8) << 1);
                if dup {
                    byte |= 0x08;
                }
                if retain {
                    byte |= 0x01;
                }
                byte
            }
            PacketType::PubAck => PUBACK,
            PacketType::PubRec => PUBREC,
            PacketType::PubRel => PUBREL,
            PacketType::PubComp => PUBCOMP,
            PacketType::Subscribe => SUBSCRIBE,
            PacketType::SubAck => SUBACK,
            PacketType::Unsubscribe => UNSUBSCRIBE,
            PacketType::UnsubAck => UNSUBACK,
            PacketType::PingReq => PINGREQ,
            PacketType::PingResp => PINGRESP,
            PacketType::Disconnect => DISCONNECT,
        }
    }

    /// Whether this is one of the packets a broker sends back in response to
    /// a client request.
    pub fn is_ack(self) -> bool {
        matches!(
            self,
            PacketType::ConnAck
                | PacketType::PubAck
                | PacketType::PubRec
                | PacketType::PubRel
                | PacketType::PubComp
                | PacketType::SubAck
                | PacketType::UnsubAck
                | PacketType::PingResp
        )
    }
}

/// Sizes of an outgoing packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PacketSize {
    /// Value of the remaining length field.
    pub remaining_length: usize,
    /// Size of the whole packet including the fixed header.
    pub packet_size: usize,
}

impl PacketSize {
    fn from_remaining_length(remaining_length: usize) -> Result<Self, CodecError> {
        if remaining_length > MAX_REMAINING_LENGTH {
            return Err(CodecError::RemainingLengthTooLarge);
        }
        Ok(Self {
            remaining_length,
            packet_size: 1 + remaining_length_size(remaining_length) + remaining_length,
        })
    }
}

/// Fixed header of an incoming packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FixedHeader {
    /// Decoded packet type.
    pub packet_type: PacketType,
    /// Number of bytes following the fixed header.
    pub remaining_length: usize,
}

/// CONNECT request parameters.
///
/// ```rust
/// use lwmqtt::network::application::mqtt::codec::ConnectInfo;
///
/// let info = ConnectInfo {
///     client_id: "my_iot_device",
///     keep_alive_seconds: 60,
///     clean_session: true,
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ConnectInfo<'a> {
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,
    /// The keep-alive time interval in seconds. Zero disables keep-alive.
    pub keep_alive_seconds: u16,
    /// Whether the broker should discard any previous session state.
    pub clean_session: bool,
}

/// One topic filter of a SUBSCRIBE or UNSUBSCRIBE request.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SubscribeInfo<'a> {
    /// Topic filter, may contain `+` and `#` wildcards.
    pub topic_filter: &'a str,
    /// Maximum QoS requested for this filter. Ignored by UNSUBSCRIBE.
    pub qos: QoS,
}

/// An application message, outgoing or incoming.
///
/// The payload is borrowed: an outgoing payload is written to the transport
/// straight from the caller's memory, an incoming one points into the buffer
/// the packet was received into.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PublishInfo<'a> {
    /// Delivery guarantee.
    pub qos: QoS,
    /// Ask the broker to retain the message.
    pub retain: bool,
    /// Redelivery flag.
    pub dup: bool,
    /// Topic name, without wildcards.
    pub topic_name: &'a str,
    /// Message payload.
    pub payload: &'a [u8],
}

/// A decoded acknowledgement.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Ack<'b> {
    /// CONNACK.
    ConnAck {
        /// The broker resumed a stored session.
        session_present: bool,
        /// Connect return code, 0 means accepted.
        return_code: u8,
    },
    /// SUBACK with one return code per requested topic filter.
    SubAck {
        /// Echoed packet identifier.
        packet_id: u16,
        /// Return codes, in the order the filters were requested.
        return_codes: &'b [u8],
    },
    /// UNSUBACK.
    UnsubAck {
        /// Echoed packet identifier.
        packet_id: u16,
    },
    /// PINGRESP.
    PingResp,
    /// PUBACK, PUBREC, PUBREL or PUBCOMP.
    Publish {
        /// Which of the four publish acknowledgements this is.
        packet_type: PacketType,
        /// Echoed packet identifier.
        packet_id: u16,
    },
}

impl Ack<'_> {
    /// Packet identifier carried by the acknowledgement, if any.
    pub fn packet_id(&self) -> Option<u16> {
        match *self {
            Ack::SubAck { packet_id, .. }
            | Ack::UnsubAck { packet_id }
            | Ack::Publish { packet_id, .. } => Some(packet_id),
            Ack::ConnAck { .. } | Ack::PingResp => None,
        }
    }
}

/// Number of bytes the remaining length field occupies for `len`.
pub fn remaining_length_size(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Encode the remaining length field for an MQTT packet.
///
/// The encoding uses up to 4 bytes where each byte encodes 7 bits of the
/// length value. The most significant bit indicates if another byte follows.
/// Returns the number of bytes written.
pub fn encode_remaining_length(buf: &mut [u8], mut len: usize) -> Result<usize, CodecError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(CodecError::RemainingLengthTooLarge);
    }
    let mut written = 0;
    loop {
        let slot = buf.get_mut(written).ok_or(CodecError::BufferTooSmall)?;
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        *slot = byte;
        written += 1;
        if len == 0 {
            break;
        }
    }
    Ok(written)
}

/// Read a fixed header from the transport.
///
/// Returns `Ok(None)` when no packet has started to arrive, that is when the
/// very first read reports no data. Once the type byte has been consumed the
/// rest of the header must follow immediately.
pub fn read_packet_header<T>(transport: &mut T) -> Result<Option<FixedHeader>, CodecError>
where
    T: Read + ?Sized,
{
    let mut byte = [0u8; 1];
    match transport.read(&mut byte) {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(_) => return Err(CodecError::ReceiveFailed),
    }
    let packet_type = PacketType::from_byte(byte[0])?;

    let mut remaining_length = 0usize;
    let mut multiplier = 1usize;
    for _ in 0..4 {
        match transport.read(&mut byte) {
            Ok(1) => {}
            Ok(_) => return Err(CodecError::MalformedRemainingLength),
            Err(_) => return Err(CodecError::ReceiveFailed),
        }
        remaining_length += (byte[0] & 0x7F) as usize * multiplier;
        if byte[0] & 0x80 == 0 {
            return Ok(Some(FixedHeader {
                packet_type,
                remaining_length,
            }));
        }
        multiplier *= 128;
    }
    Err(CodecError::MalformedRemainingLength)
}

/// Compute the size of a CONNECT packet.
pub fn connect_packet_size(info: &ConnectInfo) -> Result<PacketSize, CodecError> {
    let client_id = encoded_string_size(info.client_id)?;
    PacketSize::from_remaining_length(CONNECT_VARIABLE_HEADER_SIZE + client_id)
}

/// Serialize a CONNECT packet into `buf`, returning the bytes written.
pub fn serialize_connect(info: &ConnectInfo, buf: &mut [u8]) -> Result<usize, CodecError> {
    let size = connect_packet_size(info)?;
    let mut w = Writer::new(buf);

    // --- Fixed Header ---
    w.put_u8(CONNECT)?;
    w.put_remaining_length(size.remaining_length)?;

    // --- Variable Header ---
    w.put_u16(PROTOCOL_NAME.len() as u16)?;
    w.put_slice(PROTOCOL_NAME)?;
    w.put_u8(PROTOCOL_LEVEL)?;
    let mut connect_flags = 0;
    if info.clean_session {
        connect_flags |= 0x02;
    }
    w.put_u8(connect_flags)?;
    w.put_u16(info.keep_alive_seconds)?;

    // --- Payload ---
    w.put_str(info.client_id)?;

    Ok(w.position())
}

/// Compute the size of a SUBSCRIBE packet.
pub fn subscribe_packet_size(subscriptions: &[SubscribeInfo]) -> Result<PacketSize, CodecError> {
    if subscriptions.is_empty() {
        return Err(CodecError::EmptySubscription);
    }
    let mut remaining_length = 2;
    for subscription in subscriptions {
        validate_topic_filter(subscription.topic_filter)?;
        remaining_length += encoded_string_size(subscription.topic_filter)? + 1;
    }
    PacketSize::from_remaining_length(remaining_length)
}

/// Serialize a SUBSCRIBE packet into `buf`, returning the bytes written.
pub fn serialize_subscribe(
    subscriptions: &[SubscribeInfo],
    packet_id: u16,
    buf: &mut [u8],
) -> Result<usize, CodecError> {
    if packet_id == 0 {
        return Err(CodecError::InvalidPacketId);
    }
    let size = subscribe_packet_size(subscriptions)?;
    let mut w = Writer::new(buf);

    w.put_u8(SUBSCRIBE)?;
    w.put_remaining_length(size.remaining_length)?;
    w.put_u16(packet_id)?;
    for subscription in subscriptions {
        w.put_str(subscription.topic_filter)?;
        w.put_u8(subscription.qos as u8)?;
    }

    Ok(w.position())
}

/// Compute the size of an UNSUBSCRIBE packet.
pub fn unsubscribe_packet_size(subscriptions: &[SubscribeInfo]) -> Result<PacketSize, CodecError> {
    if subscriptions.is_empty() {
        return Err(CodecError::EmptySubscription);
    }
    let mut remaining_length = 2;
    for subscription in subscriptions {
        validate_topic_filter(subscription.topic_filter)?;
        remaining_length += encoded_string_size(subscription.topic_filter)?;
    }
    PacketSize::from_remaining_length(remaining_length)
}

/// Serialize an UNSUBSCRIBE packet into `buf`, returning the bytes written.
pub fn serialize_unsubscribe(
    subscriptions: &[SubscribeInfo],
    packet_id: u16,
    buf: &mut [u8],
) -> Result<usize, CodecError> {
    if packet_id == 0 {
        return Err(CodecError::InvalidPacketId);
    }
    let size = unsubscribe_packet_size(subscriptions)?;
    let mut w = Writer::new(buf);

    w.put_u8(UNSUBSCRIBE)?;
    w.put_remaining_length(size.remaining_length)?;
    w.put_u16(packet_id)?;
    for subscription in subscriptions {
        w.put_str(subscription.topic_filter)?;
    }

    Ok(w.position())
}

/// Compute the size of a PUBLISH packet, payload included.
pub fn publish_packet_size(info: &PublishInfo) -> Result<PacketSize, CodecError> {
    validate_topic_name(info.topic_name)?;
    let mut remaining_length = encoded_string_size(info.topic_name)? + info.payload.len();
    if info.qos != QoS::AtMostOnce {
        remaining_length += 2;
    }
    PacketSize::from_remaining_length(remaining_length)
}

/// Serialize everything of a PUBLISH packet except its payload.
///
/// The payload is meant to be written to the transport separately, straight
/// from [`PublishInfo::payload`]. `packet_id` is ignored for QoS 0.
pub fn serialize_publish_header(
    info: &PublishInfo,
    packet_id: u16,
    buf: &mut [u8],
) -> Result<usize, CodecError> {
    if info.qos != QoS::AtMostOnce && packet_id == 0 {
        return Err(CodecError::InvalidPacketId);
    }
    let size = publish_packet_size(info)?;
    let mut w = Writer::new(buf);

    let header = PacketType::Publish {
        dup: info.dup,
        qos: info.qos,
        retain: info.retain,
    };
    w.put_u8(header.to_byte())?;
    w.put_remaining_length(size.remaining_length)?;
    w.put_str(info.topic_name)?;
    if info.qos != QoS::AtMostOnce {
        w.put_u16(packet_id)?;
    }

    Ok(w.position())
}

/// Serialize a PINGREQ packet.
pub fn serialize_pingreq(buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_u8(PINGREQ)?;
    w.put_u8(0)?;
    Ok(w.position())
}

/// Serialize a DISCONNECT packet.
pub fn serialize_disconnect(buf: &mut [u8]) -> Result<usize, CodecError> {
    let mut w = Writer::new(buf);
    w.put_u8(DISCONNECT)?;
    w.put_u8(0)?;
    Ok(w.position())
}

/// Decode an acknowledgement from its fixed header and body.
pub fn deserialize_ack<'b>(header: &FixedHeader, body: &'b [u8]) -> Result<Ack<'b>, CodecError> {
    if body.len() != header.remaining_length {
        return Err(CodecError::MalformedPacket);
    }

    match header.packet_type {
        PacketType::ConnAck => {
            if body.len() != 2 || body[0] & 0xFE != 0 {
                return Err(CodecError::MalformedPacket);
            }
            let session_present = body[0] & 0x01 != 0;
            let return_code = body[1];
            // A refused connection never carries a session.
            if return_code > 5 || (session_present && return_code != 0) {
                return Err(CodecError::MalformedPacket);
            }
            Ok(Ack::ConnAck {
                session_present,
                return_code,
            })
        }
        PacketType::SubAck => {
            if body.len() < 3 {
                return Err(CodecError::MalformedPacket);
            }
            let packet_id = read_packet_id(body)?;
            // Return codes are judged per filter by the subscriber.
            Ok(Ack::SubAck {
                packet_id,
                return_codes: &body[2..],
            })
        }
        PacketType::UnsubAck => {
            if body.len() != 2 {
                return Err(CodecError::MalformedPacket);
            }
            Ok(Ack::UnsubAck {
                packet_id: read_packet_id(body)?,
            })
        }
        PacketType::PingResp => {
            if !body.is_empty() {
                return Err(CodecError::MalformedPacket);
            }
            Ok(Ack::PingResp)
        }
        packet_type @ (PacketType::PubAck
        | PacketType::PubRec
        | PacketType::PubRel
        | PacketType::PubComp) => {
            if body.len() != 2 {
                return Err(CodecError::MalformedPacket);
            }
            Ok(Ack::Publish {
                packet_type,
                packet_id: read_packet_id(body)?,
            })
        }
        other => Err(CodecError::InvalidPacketType(other.to_byte())),
    }
}

/// Decode an incoming PUBLISH packet.
///
/// Returns the packet identifier (present for QoS 1 and 2 only) and the
/// message, whose topic and payload borrow from `body`.
pub fn deserialize_publish<'b>(
    header: &FixedHeader,
    body: &'b [u8],
) -> Result<(Option<u16>, PublishInfo<'b>), CodecError> {
    let PacketType::Publish { dup, qos, retain } = header.packet_type else {
        return Err(CodecError::InvalidPacketType(header.packet_type.to_byte()));
    };
    if body.len() != header.remaining_length || body.len() < 2 {
        return Err(CodecError::MalformedPacket);
    }

    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic_end = 2 + topic_len;
    let topic_bytes = body.get(2..topic_end).ok_or(CodecError::MalformedPacket)?;
    let topic_name = core::str::from_utf8(topic_bytes).map_err(|_| CodecError::InvalidTopic)?;
    validate_topic_name(topic_name)?;

    let (packet_id, payload_start) = if qos == QoS::AtMostOnce {
        (None, topic_end)
    } else {
        let id_bytes = body
            .get(topic_end..topic_end + 2)
            .ok_or(CodecError::MalformedPacket)?;
        (Some(read_packet_id(id_bytes)?), topic_end + 2)
    };

    Ok((
        packet_id,
        PublishInfo {
            qos,
            retain,
            dup,
            topic_name,
            payload: &body[payload_start..],
        },
    ))
}

fn read_packet_id(bytes: &[u8]) -> Result<u16, CodecError> {
    match u16::from_be_bytes([bytes[0], bytes[1]]) {
        0 => Err(CodecError::InvalidPacketId),
        id => Ok(id),
    }
}

fn encoded_string_size(s: &str) -> Result<usize, CodecError> {
    if s.len() > u16::MAX as usize {
        return Err(CodecError::StringTooLong);
    }
    Ok(2 + s.len())
}

fn validate_topic_name(topic: &str) -> Result<(), CodecError> {
    if topic.is_empty() || topic.contains(['+', '#', '\0']) {
        return Err(CodecError::InvalidTopic);
    }
    Ok(())
}

fn validate_topic_filter(filter: &str) -> Result<(), CodecError> {
    if filter.is_empty() || filter.contains('\0') {
        return Err(CodecError::InvalidTopic);
    }
    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        match level {
            "#" if levels.peek().is_some() => return Err(CodecError::InvalidTopic),
            "#" | "+" => {}
            other if other.contains(['+', '#']) => return Err(CodecError::InvalidTopic),
            _ => {}
        }
    }
    Ok(())
}

/// Cursor over an output buffer.
struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> Writer<'b> {
    fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_u8(&mut self, byte: u8) -> Result<(), CodecError> {
        let slot = self.buf.get_mut(self.pos).ok_or(CodecError::BufferTooSmall)?;
        *slot = byte;
        self.pos += 1;
        Ok(())
    }

    fn put_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.put_slice(&value.to_be_bytes())
    }

    fn put_slice(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let end = self.pos + bytes.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(CodecError::BufferTooSmall)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_str(&mut self, s: &str) -> Result<(), CodecError> {
        encoded_string_size(s)?;
        self.put_u16(s.len() as u16)?;
        self.put_slice(s.as_bytes())
    }

    fn put_remaining_length(&mut self, len: usize) -> Result<(), CodecError> {
        let rest = self.buf.get_mut(self.pos..).ok_or(CodecError::BufferTooSmall)?;
        self.pos += encode_remaining_length(rest, len)?;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }
}
