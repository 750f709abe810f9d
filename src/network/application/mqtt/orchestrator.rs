//! The session loop.
//!
//! [`SessionOrchestrator`] runs the same session over and over:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Subscribing -> Active
//!      ^                                                       |
//!      +------- Disconnecting <-------- Unsubscribing <--------+
//! ```
//!
//! While `Active` it publishes `publish_count` messages to a topic it is
//! subscribed to, reading the broker's echo after each one and keeping the
//! connection alive with PINGREQ in between. Any fatal error releases the
//! transport and stops the loop.

use rand::RngCore;

use super::codec::{PublishInfo, QoS};
use super::config::{DEFAULT_BUFFER_SIZE, MAX_TOPIC_FILTERS, SessionConfig};
use super::connection::connect_with_retry;
use super::error::SessionError;
use super::handler::{PublishHandler, TopicLogger};
use super::keepalive::KeepAliveController;
use super::packet_id::PacketIdAllocator;
use super::session::Session;
use super::subscription::TopicTable;
use crate::network::Connect;
use crate::retry::Delay;

/// Lifecycle stage of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport is open.
    Disconnected,
    /// Opening the transport and exchanging CONNECT/CONNACK.
    Connecting,
    /// CONNACK accepted.
    Connected,
    /// Waiting for every topic filter to be accepted.
    Subscribing,
    /// Publishing and keeping the connection alive.
    Active,
    /// Waiting for the UNSUBACK.
    Unsubscribing,
    /// Sending DISCONNECT and releasing the transport.
    Disconnecting,
}

#[cfg(feature = "defmt")]
impl defmt::Format for SessionState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SessionState::Disconnected => defmt::write!(f, "Disconnected"),
            SessionState::Connecting => defmt::write!(f, "Connecting"),
            SessionState::Connected => defmt::write!(f, "Connected"),
            SessionState::Subscribing => defmt::write!(f, "Subscribing"),
            SessionState::Active => defmt::write!(f, "Active"),
            SessionState::Unsubscribing => defmt::write!(f, "Unsubscribing"),
            SessionState::Disconnecting => defmt::write!(f, "Disconnecting"),
        }
    }
}

/// Drives repeated MQTT sessions against one broker.
///
/// `B` is the capacity of the buffer each session serializes into and
/// receives into.
pub struct SessionOrchestrator<'a, N, D, R, H = TopicLogger, const B: usize = DEFAULT_BUFFER_SIZE>
where
    N: Connect,
{
    network: N,
    delay: D,
    rng: R,
    handler: H,
    config: SessionConfig<'a>,
    topics: TopicTable<'a, MAX_TOPIC_FILTERS>,
    packet_ids: PacketIdAllocator,
    state: SessionState,
    completed_iterations: u32,
}

impl<N, D, R, H, const B: usize> core::fmt::Debug for SessionOrchestrator<'_, N, D, R, H, B>
where
    N: Connect,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("config", &self.config)
            .field("topics", &self.topics)
            .field("packet_ids", &self.packet_ids)
            .field("state", &self.state)
            .field("completed_iterations", &self.completed_iterations)
            .finish_non_exhaustive()
    }
}

impl<'a, N, D, R> SessionOrchestrator<'a, N, D, R>
where
    N: Connect,
    D: Delay,
    R: RngCore,
{
    /// Create an orchestrator that logs incoming messages and uses a
    /// [`DEFAULT_BUFFER_SIZE`] byte buffer.
    pub fn new(network: N, delay: D, rng: R, config: SessionConfig<'a>) -> Result<Self, SessionError> {
        Self::with_handler(network, delay, rng, TopicLogger, config)
    }
}

impl<'a, N, D, R, H, const B: usize> SessionOrchestrator<'a, N, D, R, H, B>
where
    N: Connect,
    D: Delay,
    R: RngCore,
    H: PublishHandler,
{
    /// Create an orchestrator with a custom publish handler.
    ///
    /// Fails when the configuration does not validate.
    pub fn with_handler(
        network: N,
        delay: D,
        rng: R,
        handler: H,
        config: SessionConfig<'a>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let topics = TopicTable::from_filters(&config.topic_filters, QoS::AtMostOnce)?;
        Ok(Self {
            network,
            delay,
            rng,
            handler,
            config,
            topics,
            packet_ids: PacketIdAllocator::new(),
            state: SessionState::Disconnected,
            completed_iterations: 0,
        })
    }

    /// Run sessions until one fails, and return that failure.
    pub fn run(&mut self) -> SessionError {
        loop {
            if let Err(e) = self.run_iteration() {
                error!(
                    "Session loop stopped after {} iterations: {:?}",
                    self.completed_iterations,
                    e
                );
                return e;
            }
        }
    }

    /// Run one full session followed by the inter-iteration delay.
    pub fn run_iteration(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Connecting;
        let transport = match connect_with_retry(
            &mut self.network,
            self.config.broker_endpoint,
            self.config.broker_port,
            self.config.retry_config(),
            &mut self.delay,
            &mut self.rng,
        ) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        let mut session: Session<N::Connection, B> =
            Session::new(transport, self.config.ack_poll_limit);
        let outcome = self.drive(&mut session);

        self.state = SessionState::Disconnecting;
        session.close(
            &mut self.delay,
            self.config.shutdown_loops,
            self.config.shutdown_poll_delay_ms,
        );
        self.topics.reset_statuses();
        self.state = SessionState::Disconnected;
        outcome?;

        self.completed_iterations = self.completed_iterations.wrapping_add(1);
        info!(
            "Iteration {} complete, next one in {} ms.",
            self.completed_iterations,
            self.config.iteration_delay_ms
        );
        self.delay.delay_ms(self.config.iteration_delay_ms);
        Ok(())
    }

    fn drive(&mut self, session: &mut Session<N::Connection, B>) -> Result<(), SessionError> {
        let session_present = session.connect(&self.config.connect_info())?;
        self.state = SessionState::Connected;
        debug!(
            "Connected as {}, session present: {}.",
            self.config.client_identifier,
            session_present
        );

        self.state = SessionState::Subscribing;
        session.subscribe_with_retry(
            &mut self.topics,
            &mut self.packet_ids,
            self.config.retry_config(),
            &mut self.delay,
            &mut self.rng,
            &mut self.handler,
        )?;

        self.state = SessionState::Active;
        let keep_alive = KeepAliveController::new(self.config.keep_alive_seconds);
        let publish = PublishInfo {
            qos: QoS::AtMostOnce,
            retain: false,
            dup: false,
            topic_name: self.config.publish_topic(),
            payload: self.config.publish_payload.as_bytes(),
        };
        for cycle in 1..=self.config.publish_count {
            info!(
                "Publishing to {} ({} of {}).",
                publish.topic_name,
                cycle,
                self.config.publish_count
            );
            session.publish(&publish, 0)?;
            // The broker echoes the message back: the session is subscribed
            // to its own topic.
            session.process_next(&mut self.topics, &mut self.handler)?;

            self.delay.delay_ms(keep_alive.idle_delay_ms());
            if keep_alive.is_enabled() {
                session.ping()?;
                session.process_next(&mut self.topics, &mut self.handler)?;
            }
        }

        self.state = SessionState::Unsubscribing;
        session.unsubscribe_with_retry(
            &mut self.topics,
            &mut self.packet_ids,
            self.config.retry_config(),
            &mut self.delay,
            &mut self.rng,
            &mut self.handler,
        )?;

        self.state = SessionState::Disconnecting;
        session.disconnect()
    }

    /// Current lifecycle stage.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of sessions that ran to completion.
    pub fn completed_iterations(&self) -> u32 {
        self.completed_iterations
    }

    /// The configuration the orchestrator was built with.
    pub fn config(&self) -> &SessionConfig<'a> {
        &self.config
    }

    /// Topic filters and their verdicts from the latest SUBACK.
    pub fn topics(&self) -> &TopicTable<'a, MAX_TOPIC_FILTERS> {
        &self.topics
    }

    /// The identifier allocator, shared by all sessions.
    pub fn packet_ids(&self) -> &PacketIdAllocator {
        &self.packet_ids
    }

    /// The publish handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The delay provider.
    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// The connector.
    pub fn network(&self) -> &N {
        &self.network
    }
}
