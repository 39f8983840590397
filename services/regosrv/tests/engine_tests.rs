//! Serial protocol engine against a simulated controller
//!
//! - Corrupted answers are never decoded; the reading goes stale
//! - Exhausted exchanges escalate to a fatal transport error
//! - Control commands travel as write frames and are acknowledged

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{parse_request, Controller};
use errors::RegoError;
use regosrv::bus::{MockBus, Publisher, Topics};
use regosrv::core::availability::AvailabilityState;
use regosrv::core::protocol::{Command, EngineConfig, RegoCodec, SerialProtocolEngine, WheelDirection};
use regosrv::core::registers::{catalog, find, find_setting, Bank};
use regosrv::core::transport::{shared, MockTransport};
use tokio::sync::watch;

fn engine(mock: &MockTransport, config: EngineConfig) -> SerialProtocolEngine {
    SerialProtocolEngine::new(shared(Box::new(mock.clone())), Arc::new(RegoCodec), config)
}

fn setup() -> (MockTransport, Controller) {
    let mock = MockTransport::new();
    let controller = Controller::new();
    controller.attach(&mock);
    (mock, controller)
}

#[tokio::test(start_paused = true)]
async fn test_corrupted_checksum_is_never_forwarded() {
    let (mock, controller) = setup();
    controller.set_system(0x020A, 123);
    controller.set_corrupt(true);
    let mut engine = engine(&mock, EngineConfig::default());
    let outdoor = find(Bank::System, 0x020A).unwrap();

    let reading = engine.read_register(outdoor).await.unwrap();
    assert!(!reading.valid);
    assert_eq!(reading.raw_value, None);
    assert_eq!(reading.decoded_value, None);
    assert_eq!(mock.sent_frames().len(), 3);
    assert_eq!(engine.stats().exhausted, 1);

    let bus = MockBus::new();
    let (_tx, rx) = watch::channel(AvailabilityState::Online);
    let mut publisher = Publisher::new(Arc::new(bus.clone()), Topics::default(), rx);
    publisher.reading(outdoor, &reading).await;
    assert!(bus.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_transient_corruption() {
    let (mock, controller) = setup();
    controller.set_system(0x020B, 480);
    let mut engine = engine(&mock, EngineConfig::default());
    let hot_water = find(Bank::System, 0x020B).unwrap();

    controller.set_corrupt(true);
    assert!(!engine.read_register(hot_water).await.unwrap().valid);
    assert_eq!(engine.consecutive_failures(), 1);

    controller.set_corrupt(false);
    let reading = engine.read_register(hot_water).await.unwrap();
    assert_eq!(reading.decoded_value, Some(48.0));
    assert_eq!(engine.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_exhausted_requests_become_fatal() {
    let (mock, controller) = setup();
    controller.set_corrupt(true);
    let config = EngineConfig {
        fatal_threshold: 4,
        ..Default::default()
    };
    let mut engine = engine(&mock, config);
    let temperatures: Vec<_> = catalog()
        .iter()
        .filter(|d| d.bank == Bank::System && d.is_polled())
        .take(4)
        .collect();

    // Re-reading the same register does not count twice
    for _ in 0..3 {
        assert!(!engine.read_register(temperatures[0]).await.unwrap().valid);
    }
    for descriptor in &temperatures[1..3] {
        assert!(!engine.read_register(descriptor).await.unwrap().valid);
    }
    assert_eq!(engine.consecutive_failures(), 3);

    let err = engine.read_register(temperatures[3]).await.unwrap_err();
    assert!(matches!(err, RegoError::FatalTransport(_)));
    assert!(err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn test_silent_line_times_out_within_budget() {
    let mock = MockTransport::new();
    let config = EngineConfig {
        retry_budget: 2,
        retry_backoff: Duration::from_millis(50),
        response_timeout: Duration::from_millis(200),
        fatal_threshold: 10,
    };
    let mut engine = engine(&mock, config);

    let started = tokio::time::Instant::now();
    let row = engine.read_display_row(0).await.unwrap();
    assert!(!row.valid);
    assert_eq!(row.text, None);
    assert_eq!(started.elapsed(), Duration::from_millis(450));
}

#[tokio::test(start_paused = true)]
async fn test_display_row_decoding() {
    let (mock, controller) = setup();
    controller.set_display(1, "GT1 32.5°C");
    let mut engine = engine(&mock, EngineConfig::default());

    let row = engine.read_display_row(1).await.unwrap();
    assert!(row.valid);
    assert_eq!(row.text.as_deref(), Some("GT1 32.5°C"));
    assert!(row.timestamp <= Utc::now());
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_written_and_acknowledged() {
    let (mock, controller) = setup();
    let mut engine = engine(&mock, EngineConfig::default());

    let indoor = find_setting("indoor_temp_setting").unwrap();
    assert!(engine
        .execute(&Command::write_setting(indoor, 21.5).unwrap())
        .await
        .unwrap());
    assert!(engine.execute(&Command::PressKey(2)).await.unwrap());
    assert!(engine
        .execute(&Command::TurnWheel(WheelDirection::Left))
        .await
        .unwrap());

    let writes = controller.writes();
    assert_eq!(writes.len(), 3);
    assert_eq!((writes[0].command, writes[0].address, writes[0].value), (0x03, 0x0021, 215));
    assert_eq!((writes[1].command, writes[1].address, writes[1].value), (0x01, 0x000A, 1));
    assert_eq!((writes[2].command, writes[2].address, writes[2].value), (0x01, 0x0044, -1));

    // Wheel left travels as 03 7F 7F
    let frame = mock.sent_frames().last().cloned().unwrap();
    assert_eq!(&frame[5..8], &[0x03, 0x7F, 0x7F]);
    assert_eq!(parse_request(&frame).unwrap().value, -1);
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_command_reports_false() {
    let mock = MockTransport::new();
    let mut engine = engine(&mock, EngineConfig::default());

    assert!(!engine.execute(&Command::PressKey(1)).await.unwrap());
    assert_eq!(mock.sent_frames().len(), 3);
}
