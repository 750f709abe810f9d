mod common;

use common::{Broker, MockNetwork, RecordingDelay, RecordingHandler, broker};
use lwmqtt::network::application::mqtt::{
    AckStatus, ConfigError, RetryOperation, SessionConfig, SessionError, SessionOrchestrator, SessionState,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;

type TestOrchestrator<'a> =
    SessionOrchestrator<'a, MockNetwork, RecordingDelay, SmallRng, RecordingHandler>;

const TOPIC: &str = "orchestrator-test/example/topic";

fn config() -> SessionConfig<'static> {
    SessionConfig::new("broker.local", "orchestrator-test", TOPIC)
}

fn orchestrator<'a>(
    broker: &Broker,
    failures: u32,
    config: SessionConfig<'a>,
) -> TestOrchestrator<'a> {
    TestOrchestrator::with_handler(
        MockNetwork::new(broker, failures),
        RecordingDelay::default(),
        SmallRng::seed_from_u64(0x5eed),
        RecordingHandler::default(),
        config,
    )
    .unwrap()
}

#[test]
fn test_one_iteration_runs_full_lifecycle() {
    let broker = broker();
    let mut orchestrator = orchestrator(&broker, 0, config());
    assert_eq!(orchestrator.state(), SessionState::Disconnected);

    orchestrator.run_iteration().unwrap();

    let mut expected = vec![0x10, 0x82];
    for _ in 0..5 {
        expected.extend_from_slice(&[0x30, 0xC0]);
    }
    expected.extend_from_slice(&[0xA2, 0xE0]);
    assert_eq!(broker.borrow().packet_types(), expected);

    let messages = &orchestrator.handler().messages;
    assert_eq!(messages.len(), 5);
    assert!(messages.iter().all(|m| m.topic == TOPIC && m.subscribed));
    assert_eq!(messages[0].payload, b"Hello Light Weight MQTT World!");

    // Five idle delays of a quarter keep-alive, then the iteration delay.
    assert_eq!(
        orchestrator.delay().sleeps,
        vec![2_500, 2_500, 2_500, 2_500, 2_500, 5_000]
    );

    assert_eq!(orchestrator.state(), SessionState::Disconnected);
    assert_eq!(orchestrator.completed_iterations(), 1);
    assert_eq!(orchestrator.network().attempts, 1);
    let state = broker.borrow();
    assert_eq!(state.shutdowns, 1);
    assert_eq!(state.closes, 1);
}

#[test]
fn test_packet_ids_continue_across_iterations() {
    let broker = broker();
    let mut orchestrator = orchestrator(&broker, 0, config());

    orchestrator.run_iteration().unwrap();
    orchestrator.run_iteration().unwrap();

    let state = broker.borrow();
    let ids: Vec<u16> = state
        .received
        .iter()
        .filter(|p| p[0] == 0x82 || p[0] == 0xA2)
        .map(|p| u16::from_be_bytes([p[2], p[3]]))
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(orchestrator.packet_ids().last(), 4);
    assert_eq!(state.closes, 2);
}

#[test]
fn test_keep_alive_disabled_sends_no_ping() {
    let broker = broker();
    let mut config = config();
    config.keep_alive_seconds = 0;
    config.publish_count = 2;
    let mut orchestrator = orchestrator(&broker, 0, config);

    orchestrator.run_iteration().unwrap();

    assert_eq!(
        broker.borrow().packet_types(),
        vec![0x10, 0x82, 0x30, 0x30, 0xA2, 0xE0]
    );
}

#[test]
fn test_publish_topic_override() {
    let broker = broker();
    let mut config = SessionConfig::new("broker.local", "orchestrator-test", "sensors/#");
    config.publish_topic = Some("sensors/kitchen");
    config.publish_payload = "21.5";
    config.publish_count = 1;
    let mut orchestrator = orchestrator(&broker, 0, config);

    orchestrator.run_iteration().unwrap();

    let messages = &orchestrator.handler().messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "sensors/kitchen");
    assert_eq!(messages[0].payload, b"21.5");
    assert!(messages[0].subscribed);
}

#[test]
fn test_run_stops_when_connect_retries_are_exhausted() {
    let broker = broker();
    let mut config = config();
    config.max_retry_attempts = 3;
    let mut orchestrator = orchestrator(&broker, u32::MAX, config);

    let fatal = orchestrator.run();

    assert_eq!(
        fatal,
        SessionError::RetriesExhausted(RetryOperation::Connect)
    );
    assert_eq!(orchestrator.network().attempts, 3);
    assert_eq!(orchestrator.delay().sleeps.len(), 2);
    assert_eq!(orchestrator.state(), SessionState::Disconnected);
    assert_eq!(orchestrator.completed_iterations(), 0);
}

#[test]
fn test_connect_recovers_within_retry_budget() {
    let broker = broker();
    let mut config = config();
    config.publish_count = 1;
    let mut orchestrator = orchestrator(&broker, 2, config);

    orchestrator.run_iteration().unwrap();

    assert_eq!(orchestrator.network().attempts, 3);
    assert_eq!(orchestrator.completed_iterations(), 1);
}

#[test]
fn test_refused_connection_releases_transport() {
    let broker = broker();
    broker.borrow_mut().connack_code = 2;
    let mut orchestrator = orchestrator(&broker, 0, config());

    assert_eq!(
        orchestrator.run_iteration(),
        Err(SessionError::ConnectionRefused(2))
    );

    assert_eq!(orchestrator.state(), SessionState::Disconnected);
    assert_eq!(orchestrator.completed_iterations(), 0);
    assert!(orchestrator.delay().sleeps.is_empty());
    let state = broker.borrow();
    assert_eq!(state.closes, 1);
    assert_eq!(state.packet_types(), vec![0x10]);
}

#[test]
fn test_rejected_subscription_ends_the_loop() {
    let broker = broker();
    for _ in 0..4 {
        broker.borrow_mut().suback_script.push_back(vec![0x80]);
    }
    let mut config = config();
    config.max_retry_attempts = 2;
    let mut orchestrator = orchestrator(&broker, 0, config);

    assert_eq!(
        orchestrator.run(),
        SessionError::RetriesExhausted(RetryOperation::Subscribe)
    );

    let state = broker.borrow();
    assert_eq!(state.packet_types(), vec![0x10, 0x82, 0x82]);
    assert_eq!(state.closes, 1);
    assert!(
        orchestrator
            .topics()
            .iter()
            .all(|t| t.status == AckStatus::Pending)
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let broker = broker();
    let mut config = config();
    config.topic_filters.clear();

    let result = TestOrchestrator::with_handler(
        MockNetwork::new(&broker, 0),
        RecordingDelay::default(),
        SmallRng::seed_from_u64(1),
        RecordingHandler::default(),
        config,
    );

    assert!(matches!(
        result,
        Err(SessionError::InvalidConfig(ConfigError::NoTopicFilters))
    ));
}
