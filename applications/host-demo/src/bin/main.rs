//! Runs the session loop against a broker until it fails.
//!
//! Settings come from the JSON file named by `MQTT_DEMO_CONFIG`. Without
//! one, `MQTT_BROKER_ENDPOINT`, `MQTT_BROKER_PORT` and `MQTT_CLIENT_ID` are
//! read from the environment (or a `.env` file) and everything else keeps
//! its default.

use std::env;
use std::fs;
use std::process::ExitCode;

use lwmqtt::network::application::mqtt::{SessionConfig, SessionOrchestrator};
use lwmqtt::network::client::tcp::TcpConnector;
use lwmqtt::retry::StdDelay;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use simple_logger::SimpleLogger;

const TOPIC: &str = "lwmqtt-demo/example/topic";

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = SimpleLogger::new().with_level(log::LevelFilter::Info).init() {
        eprintln!("logger: {e}");
        return ExitCode::FAILURE;
    }

    let json = match env::var("MQTT_DEMO_CONFIG") {
        Ok(path) => match fs::read_to_string(&path) {
            Ok(json) => Some(json),
            Err(e) => {
                log::error!("cannot read {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        Err(_) => None,
    };
    let endpoint = env::var("MQTT_BROKER_ENDPOINT").unwrap_or("test.mosquitto.org".to_string());
    let client_id = env::var("MQTT_CLIENT_ID").unwrap_or("lwmqtt-host-demo".to_string());

    let config = match json.as_deref() {
        Some(json) => match SessionConfig::from_json(json) {
            Ok(config) => config,
            Err(e) => {
                log::error!("invalid configuration: {e:?}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut config = SessionConfig::new(&endpoint, &client_id, TOPIC);
            if let Some(port) = env::var("MQTT_BROKER_PORT").ok().and_then(|p| p.parse().ok()) {
                config.broker_port = port;
            }
            config
        }
    };

    let mut orchestrator = match SessionOrchestrator::new(
        TcpConnector::default(),
        StdDelay,
        SmallRng::seed_from_u64(u64::from(std::process::id())),
        config,
    ) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            log::error!("invalid configuration: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    let fatal = orchestrator.run();
    log::error!(
        "stopped after {} iterations: {fatal:?}",
        orchestrator.completed_iterations()
    );
    ExitCode::FAILURE
}
