//! Session configuration.
//!
//! A [`SessionConfig`] is usually parsed once at startup from a JSON document
//! with `serde-json-core`. All strings borrow from that document, so it has to
//! outlive the orchestrator. Every field except the broker endpoint, the
//! client identifier and the topic filters has a default.
//!
//! ```rust
//! use lwmqtt::network::application::mqtt::SessionConfig;
//!
//! let json = r#"{
//!     "broker_endpoint": "test.mosquitto.org",
//!     "client_identifier": "node-7",
//!     "topic_filters": ["node-7/example/topic"],
//!     "publish_count": 2
//! }"#;
//!
//! let config = SessionConfig::from_json(json).unwrap();
//! assert_eq!(config.broker_port, 1883);
//! assert_eq!(config.keep_alive_seconds, 10);
//! assert_eq!(config.publish_topic(), "node-7/example/topic");
//! ```

use crate::retry::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, RetryConfig,
};
use heapless::Vec;
use serde::Deserialize;

use super::codec::ConnectInfo;

/// Default capacity of the session buffer shared by every packet.
pub const DEFAULT_BUFFER_SIZE: usize = 500;
/// Maximum number of topic filters a configuration may name.
pub const MAX_TOPIC_FILTERS: usize = 8;

/// Default MQTT broker port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECONDS: u16 = 10;
/// Default message published by the session.
pub const DEFAULT_PUBLISH_PAYLOAD: &str = "Hello Light Weight MQTT World!";
/// Default number of publish cycles per session.
pub const DEFAULT_PUBLISH_COUNT: u32 = 5;
/// Default pause between two sessions.
pub const DEFAULT_ITERATION_DELAY_MS: u32 = 5_000;
/// Default bound on receive polls while draining a closing transport.
pub const DEFAULT_SHUTDOWN_LOOPS: u32 = 3;
/// Default pause between those polls.
pub const DEFAULT_SHUTDOWN_POLL_DELAY_MS: u32 = 250;
/// Default number of consecutive empty polls tolerated while awaiting an ack.
pub const DEFAULT_ACK_POLL_LIMIT: u32 = 10;

/// Reasons a configuration is rejected.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConfigError {
    /// The JSON document could not be parsed.
    Parse,
    /// `broker_endpoint` is empty.
    EmptyEndpoint,
    /// `client_identifier` is empty.
    EmptyClientIdentifier,
    /// `topic_filters` is empty.
    NoTopicFilters,
    /// The publish topic is empty or contains a wildcard.
    InvalidPublishTopic,
    /// `max_retry_attempts` is zero.
    ZeroRetryAttempts,
    /// `ack_poll_limit` is zero.
    ZeroAckPollLimit,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ConfigError::Parse => defmt::write!(f, "Parse"),
            ConfigError::EmptyEndpoint => defmt::write!(f, "EmptyEndpoint"),
            ConfigError::EmptyClientIdentifier => defmt::write!(f, "EmptyClientIdentifier"),
            ConfigError::NoTopicFilters => defmt::write!(f, "NoTopicFilters"),
            ConfigError::InvalidPublishTopic => defmt::write!(f, "InvalidPublishTopic"),
            ConfigError::ZeroRetryAttempts => defmt::write!(f, "ZeroRetryAttempts"),
            ConfigError::ZeroAckPollLimit => defmt::write!(f, "ZeroAckPollLimit"),
        }
    }
}

/// Everything a [`SessionOrchestrator`](super::SessionOrchestrator) needs to
/// know about the broker and the demo workload.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig<'a> {
    /// Host name or address of the broker.
    #[serde(borrow)]
    pub broker_endpoint: &'a str,
    /// TCP port of the broker.
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// MQTT client identifier.
    #[serde(borrow)]
    pub client_identifier: &'a str,
    /// Keep-alive interval sent in CONNECT. Zero disables PINGREQ.
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u16,
    /// Topic filters subscribed to at the start of every session.
    #[serde(borrow)]
    pub topic_filters: Vec<&'a str, MAX_TOPIC_FILTERS>,
    /// Topic published to. Defaults to the first topic filter.
    #[serde(borrow, default)]
    pub publish_topic: Option<&'a str>,
    /// Payload of every published message.
    #[serde(borrow, default = "default_publish_payload")]
    pub publish_payload: &'a str,
    /// Publish and keep-alive cycles per session.
    #[serde(default = "default_publish_count")]
    pub publish_count: u32,
    /// Attempts for connecting and subscribing, the first one included.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Initial backoff jitter ceiling.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u32,
    /// Largest backoff jitter ceiling.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u32,
    /// Pause between the end of one session and the start of the next.
    #[serde(default = "default_iteration_delay_ms")]
    pub iteration_delay_ms: u32,
    /// Bound on receive polls while draining a closing transport.
    #[serde(default = "default_shutdown_loops")]
    pub shutdown_loops: u32,
    /// Pause between those polls.
    #[serde(default = "default_shutdown_poll_delay_ms")]
    pub shutdown_poll_delay_ms: u32,
    /// Consecutive empty polls tolerated while awaiting an acknowledgement.
    #[serde(default = "default_ack_poll_limit")]
    pub ack_poll_limit: u32,
}

fn default_broker_port() -> u16 {
    DEFAULT_BROKER_PORT
}

fn default_keep_alive_seconds() -> u16 {
    DEFAULT_KEEP_ALIVE_SECONDS
}

fn default_publish_payload() -> &'static str {
    DEFAULT_PUBLISH_PAYLOAD
}

fn default_publish_count() -> u32 {
    DEFAULT_PUBLISH_COUNT
}

fn default_max_retry_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_base_backoff_ms() -> u32 {
    DEFAULT_BASE_BACKOFF_MS
}

fn default_max_backoff_ms() -> u32 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_iteration_delay_ms() -> u32 {
    DEFAULT_ITERATION_DELAY_MS
}

fn default_shutdown_loops() -> u32 {
    DEFAULT_SHUTDOWN_LOOPS
}

fn default_shutdown_poll_delay_ms() -> u32 {
    DEFAULT_SHUTDOWN_POLL_DELAY_MS
}

fn default_ack_poll_limit() -> u32 {
    DEFAULT_ACK_POLL_LIMIT
}

impl<'a> SessionConfig<'a> {
    /// Build a configuration with a single topic filter and default settings.
    pub fn new(broker_endpoint: &'a str, client_identifier: &'a str, topic_filter: &'a str) -> Self {
        let mut topic_filters = Vec::new();
        // Capacity is at least one.
        let _ = topic_filters.push(topic_filter);
        Self {
            broker_endpoint,
            broker_port: DEFAULT_BROKER_PORT,
            client_identifier,
            keep_alive_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
            topic_filters,
            publish_topic: None,
            publish_payload: DEFAULT_PUBLISH_PAYLOAD,
            publish_count: DEFAULT_PUBLISH_COUNT,
            max_retry_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            iteration_delay_ms: DEFAULT_ITERATION_DELAY_MS,
            shutdown_loops: DEFAULT_SHUTDOWN_LOOPS,
            shutdown_poll_delay_ms: DEFAULT_SHUTDOWN_POLL_DELAY_MS,
            ack_poll_limit: DEFAULT_ACK_POLL_LIMIT,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &'a str) -> Result<Self, ConfigError> {
        let (config, _) =
            serde_json_core::from_str::<SessionConfig<'a>>(json).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that would make every session fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_endpoint.is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if self.client_identifier.is_empty() {
            return Err(ConfigError::EmptyClientIdentifier);
        }
        if self.topic_filters.is_empty() {
            return Err(ConfigError::NoTopicFilters);
        }
        let topic = self.publish_topic();
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(ConfigError::InvalidPublishTopic);
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        if self.ack_poll_limit == 0 {
            return Err(ConfigError::ZeroAckPollLimit);
        }
        Ok(())
    }

    /// Topic the session publishes to.
    pub fn publish_topic(&self) -> &'a str {
        match self.publish_topic {
            Some(topic) => topic,
            None => self.topic_filters.first().copied().unwrap_or(""),
        }
    }

    /// CONNECT parameters. Sessions are always clean.
    pub fn connect_info(&self) -> ConnectInfo<'a> {
        ConnectInfo {
            client_id: self.client_identifier,
            keep_alive_seconds: self.keep_alive_seconds,
            clean_session: true,
        }
    }

    /// Backoff parameters shared by connecting and subscribing.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            base_backoff_ms: self.base_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_applies_defaults() {
        let json = r#"{"broker_endpoint":"localhost","client_identifier":"c1","topic_filters":["c1/example/topic"]}"#;
        let config = SessionConfig::from_json(json).unwrap();

        assert_eq!(config.broker_endpoint, "localhost");
        assert_eq!(config.broker_port, DEFAULT_BROKER_PORT);
        assert_eq!(config.keep_alive_seconds, DEFAULT_KEEP_ALIVE_SECONDS);
        assert_eq!(config.publish_payload, DEFAULT_PUBLISH_PAYLOAD);
        assert_eq!(config.publish_count, DEFAULT_PUBLISH_COUNT);
        assert_eq!(config.shutdown_loops, DEFAULT_SHUTDOWN_LOOPS);
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert_eq!(config.publish_topic(), "c1/example/topic");
    }

    #[test]
    fn test_from_json_overrides() {
        let json = r#"{
            "broker_endpoint": "10.0.0.2",
            "broker_port": 8883,
            "client_identifier": "c2",
            "keep_alive_seconds": 0,
            "topic_filters": ["a/+", "b/#"],
            "publish_topic": "a/1",
            "publish_payload": "ping",
            "max_retry_attempts": 2
        }"#;
        let config = SessionConfig::from_json(json).unwrap();

        assert_eq!(config.broker_port, 8883);
        assert_eq!(config.keep_alive_seconds, 0);
        assert_eq!(config.topic_filters.len(), 2);
        assert_eq!(config.publish_topic(), "a/1");
        assert_eq!(config.publish_payload, "ping");
        assert_eq!(config.retry_config().max_attempts, 2);
        assert!(config.connect_info().clean_session);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert_eq!(
            SessionConfig::from_json("{\"broker_endpoint\":").unwrap_err(),
            ConfigError::Parse
        );
        // Missing required field.
        assert_eq!(
            SessionConfig::from_json(r#"{"broker_endpoint":"h","topic_filters":["t"]}"#)
                .unwrap_err(),
            ConfigError::Parse
        );
    }

    #[test]
    fn test_validate() {
        let mut config = SessionConfig::new("broker", "client", "t/1");
        assert_eq!(config.validate(), Ok(()));

        config.broker_endpoint = "";
        assert_eq!(config.validate(), Err(ConfigError::EmptyEndpoint));
        config.broker_endpoint = "broker";

        config.client_identifier = "";
        assert_eq!(config.validate(), Err(ConfigError::EmptyClientIdentifier));
        config.client_identifier = "client";

        config.max_retry_attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroRetryAttempts));
        config.max_retry_attempts = 1;

        config.ack_poll_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroAckPollLimit));
        config.ack_poll_limit = 1;

        config.topic_filters.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoTopicFilters));
    }

    #[test]
    fn test_wildcard_filter_needs_explicit_publish_topic() {
        let mut config = SessionConfig::new("broker", "client", "sensors/#");
        assert_eq!(config.validate(), Err(ConfigError::InvalidPublishTopic));

        config.publish_topic = Some("sensors/1");
        assert_eq!(config.validate(), Ok(()));
    }
}
