//! In-process broker simulator for session tests.
//!
//! [`MockConnection`] parses every packet the client writes and queues the
//! answer a broker would give. The broker state is shared through an
//! `Rc<RefCell<_>>` so that a test can keep a handle on it after the
//! connection has been moved into a session or an orchestrator.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use lwmqtt::network::application::mqtt::{PublishHandler, PublishInfo};
use lwmqtt::network::error::Error;
use lwmqtt::network::{Close, Connect, Connection, Read, Shutdown, Write};
use lwmqtt::retry::Delay;

/// Behaviour switches and recorded traffic of the simulated broker.
#[derive(Debug)]
pub struct BrokerState {
    /// Answer CONNECT with a CONNACK.
    pub answer_connect: bool,
    /// Return code of the CONNACK.
    pub connack_code: u8,
    /// Answer SUBSCRIBE with a SUBACK.
    pub answer_subscribe: bool,
    /// Return codes of the next SUBACKs; granted QoS 0 for every filter
    /// once empty.
    pub suback_script: VecDeque<Vec<u8>>,
    /// Added to the packet identifier echoed in SUBACK.
    pub suback_id_offset: u16,
    /// Hold every SUBACK back until the next SUBSCRIBE arrives.
    pub late_subacks: bool,
    /// Answer UNSUBSCRIBE with an UNSUBACK.
    pub answer_unsubscribe: bool,
    /// Added to the packet identifier echoed in UNSUBACK.
    pub unsuback_id_offset: u16,
    /// Send every PUBLISH back to the client.
    pub echo_publish: bool,
    /// Answer PINGREQ with a PINGRESP.
    pub answer_ping: bool,
    /// Report an error from `read` once the client half-closed.
    pub close_on_shutdown: bool,
    /// Accept one byte less than asked on every write.
    pub short_writes: bool,

    /// Complete packets received from the client, across connections.
    pub received: Vec<Vec<u8>>,
    /// Size of every `write` call.
    pub writes: Vec<usize>,
    /// Number of `read` calls.
    pub reads: usize,
    /// Number of `shutdown` calls.
    pub shutdowns: usize,
    /// Number of `close` calls.
    pub closes: usize,

    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    shut_down: bool,
    held_suback: Option<Vec<u8>>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            answer_connect: true,
            connack_code: 0,
            answer_subscribe: true,
            suback_script: VecDeque::new(),
            suback_id_offset: 0,
            late_subacks: false,
            answer_unsubscribe: true,
            unsuback_id_offset: 0,
            echo_publish: true,
            answer_ping: true,
            close_on_shutdown: true,
            short_writes: false,
            received: Vec::new(),
            writes: Vec::new(),
            reads: 0,
            shutdowns: 0,
            closes: 0,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            shut_down: false,
            held_suback: None,
        }
    }
}

impl BrokerState {
    /// Queue raw bytes for the client to read.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.outbound.extend(bytes.iter().copied());
    }

    /// Packets received from the client whose type nibble matches `packet_type`.
    pub fn packets_of_type(&self, packet_type: u8) -> Vec<&Vec<u8>> {
        self.received
            .iter()
            .filter(|p| p[0] & 0xF0 == packet_type & 0xF0)
            .collect()
    }

    /// Type bytes of every received packet, in order.
    pub fn packet_types(&self) -> Vec<u8> {
        self.received.iter().map(|p| p[0]).collect()
    }

    fn reset_wire(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.shut_down = false;
    }

    fn absorb(&mut self, bytes: &[u8]) {
        self.inbound.extend_from_slice(bytes);
        while let Some((header_len, body_len)) = frame(&self.inbound) {
            if self.inbound.len() < header_len + body_len {
                break;
            }
            let packet: Vec<u8> = self.inbound.drain(..header_len + body_len).collect();
            self.respond(&packet, header_len);
            self.received.push(packet);
        }
    }

    fn respond(&mut self, packet: &[u8], header_len: usize) {
        let body = &packet[header_len..];
        match packet[0] {
            0x10 if self.answer_connect => {
                let code = self.connack_code;
                self.inject(&[0x20, 0x02, 0x00, code]);
            }
            0x82 if self.answer_subscribe => {
                let id = u16::from_be_bytes([body[0], body[1]]).wrapping_add(self.suback_id_offset);
                let codes = self
                    .suback_script
                    .pop_front()
                    .unwrap_or_else(|| vec![0x00; count_filters(&body[2..])]);
                let mut suback = vec![0x90, (2 + codes.len()) as u8];
                suback.extend_from_slice(&id.to_be_bytes());
                suback.extend_from_slice(&codes);
                if !self.late_subacks {
                    self.inject(&suback);
                } else if let Some(stale) = self.held_suback.replace(suback) {
                    self.inject(&stale);
                }
            }
            0xA2 if self.answer_unsubscribe => {
                let id = u16::from_be_bytes([body[0], body[1]]).wrapping_add(self.unsuback_id_offset);
                let [high, low] = id.to_be_bytes();
                self.inject(&[0xB0, 0x02, high, low]);
            }
            0xC0 if self.answer_ping => self.inject(&[0xD0, 0x00]),
            byte if byte & 0xF0 == 0x30 && self.echo_publish => self.inject(packet),
            _ => {}
        }
    }
}

/// Header length and remaining length of the packet at the start of `bytes`.
fn frame(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut len = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in bytes.iter().enumerate().skip(1).take(4) {
        len += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Some((i + 1, len));
        }
        multiplier *= 128;
    }
    None
}

/// Number of topic filters in a SUBSCRIBE payload.
fn count_filters(mut payload: &[u8]) -> usize {
    let mut count = 0;
    while payload.len() >= 2 {
        let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        payload = &payload[2 + len + 1..];
        count += 1;
    }
    count
}

/// Shared handle on a [`BrokerState`].
pub type Broker = Rc<RefCell<BrokerState>>;

/// Create a broker with default behaviour.
pub fn broker() -> Broker {
    Rc::new(RefCell::new(BrokerState::default()))
}

/// Client side of a connection to the simulated broker.
#[derive(Debug)]
pub struct MockConnection {
    broker: Broker,
}

impl MockConnection {
    /// Attach to `broker`. Bytes already injected stay queued.
    pub fn new(broker: &Broker) -> Self {
        Self {
            broker: broker.clone(),
        }
    }
}

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.broker.borrow_mut();
        state.reads += 1;
        if state.outbound.is_empty() {
            if state.shut_down && state.close_on_shutdown {
                return Err(Error::ConnectionClosed);
            }
            return Ok(0);
        }
        let n = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.broker.borrow_mut();
        if state.shut_down {
            return Err(Error::NotOpen);
        }
        state.writes.push(buf.len());
        let accepted = if state.short_writes {
            buf.len().saturating_sub(1)
        } else {
            buf.len()
        };
        state.absorb(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Shutdown for MockConnection {
    type Error = Error;

    fn shutdown(&mut self) -> Result<(), Self::Error> {
        let mut state = self.broker.borrow_mut();
        state.shutdowns += 1;
        state.shut_down = true;
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        self.broker.borrow_mut().closes += 1;
        Ok(())
    }
}

impl Connection for MockConnection {}

/// Connector whose first `failures` attempts are refused.
#[derive(Debug)]
pub struct MockNetwork {
    broker: Broker,
    failures: u32,
    /// Number of `connect` calls.
    pub attempts: u32,
}

impl MockNetwork {
    /// Create a connector to `broker` that refuses `failures` attempts first.
    pub fn new(broker: &Broker, failures: u32) -> Self {
        Self {
            broker: broker.clone(),
            failures,
            attempts: 0,
        }
    }
}

impl Connect for MockNetwork {
    type Connection = MockConnection;
    type Error = Error;

    fn connect(&mut self, _host: &str, _port: u16) -> Result<Self::Connection, Self::Error> {
        self.attempts += 1;
        if self.attempts <= self.failures {
            return Err(Error::ConnectionRefused);
        }
        self.broker.borrow_mut().reset_wire();
        Ok(MockConnection::new(&self.broker))
    }
}

/// [`Delay`] that records instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    /// Every requested delay, in order.
    pub sleeps: Vec<u32>,
}

impl Delay for RecordingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.sleeps.push(ms);
    }
}

/// A message seen by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub topic: String,
    pub payload: Vec<u8>,
    pub subscribed: bool,
}

/// [`PublishHandler`] that keeps a copy of every message.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub messages: Vec<Received>,
}

impl PublishHandler for RecordingHandler {
    fn on_publish(&mut self, _packet_id: Option<u16>, publish: &PublishInfo<'_>, subscribed: bool) {
        self.messages.push(Received {
            topic: publish.topic_name.to_string(),
            payload: publish.payload.to_vec(),
            subscribed,
        });
    }
}

/// Encode a QoS 0 PUBLISH as a broker would send it.
pub fn publish_packet(topic: &str, payload: &[u8]) -> Vec<u8> {
    let remaining = 2 + topic.len() + payload.len();
    assert!(remaining < 128);
    let mut packet = vec![0x30, remaining as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}
