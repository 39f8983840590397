//! MQTT bus
//!
//! [`MqttBus`] is the publishing handle; [`run_driver`] owns the `rumqttc`
//! event loop. The driver reports session changes as [`LinkEvent`]s, turns
//! `set` messages into commands and reconnects with exponential backoff.

use async_trait::async_trait;
use errors::{RegoError, RegoResult};
use rand::Rng;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::topics::{Topics, DEFAULT_PREFIX};
use super::{BusClient, Message, QosLevel};
use crate::core::protocol::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub topic_prefix: String,
    /// First reconnect delay; doubled per failed attempt
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Outgoing request queue of the client
    pub capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "regosrv".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 30,
            topic_prefix: DEFAULT_PREFIX.to_string(),
            reconnect_initial_ms: 1000,
            reconnect_max_ms: 30_000,
            capacity: 64,
        }
    }
}

/// Session changes seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Driver started its first connection attempt
    Connecting,
    /// Broker accepted the session
    Up,
    /// Connection attempt failed or an established session dropped
    Down,
}

/// Exponential reconnect delay with jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        let jitter_ms = delay.as_millis() as u64 / 10;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

impl MqttBus {
    /// Build the client; nothing is sent until the event loop is polled
    pub fn new(config: &MqttConfig, topics: &Topics) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        options.set_last_will(LastWill::new(
            topics.availability(),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, config.capacity.max(1));
        (Self { client }, eventloop)
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

fn qos(level: QosLevel) -> QoS {
    match level {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
    }
}

#[async_trait]
impl BusClient for MqttBus {
    async fn publish(&self, message: Message) -> RegoResult<()> {
        self.client
            .publish(
                message.topic,
                qos(message.qos),
                message.retain,
                message.payload.into_bytes(),
            )
            .await
            .map_err(|e| RegoError::Bus(e.to_string()))
    }

    async fn disconnect(&self) -> RegoResult<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| RegoError::Bus(e.to_string()))
    }
}

/// Drive the MQTT event loop until a clean disconnect or cancellation
///
/// Cancellation only interrupts the reconnect backoff; while connected the
/// loop keeps running so queued messages (the final `offline`) still go out
/// before the disconnect packet.
///
/// Publishes still queued in `rumqttc` when a session drops are sent on the
/// next session and may reach the broker after its `online`.
pub async fn run_driver(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Topics,
    links: mpsc::Sender<LinkEvent>,
    commands: mpsc::Sender<Command>,
    mut backoff: Backoff,
    cancel: CancellationToken,
) {
    let _ = links.send(LinkEvent::Connecting).await;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!("MQTT connection refused: {:?}", ack.code);
                    continue;
                }
                backoff.reset();
                info!("MQTT connected");
                if let Err(e) = client.try_subscribe(topics.command_filter(), QoS::AtLeastOnce) {
                    error!("MQTT subscribe failed: {}", e);
                }
                let _ = links.send(LinkEvent::Up).await;
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload);
                forward_command(&topics, &commands, &publish.topic, &payload);
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("MQTT disconnected");
                break;
            },
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                let _ = links.send(LinkEvent::Down).await;
                if cancel.is_cancelled() {
                    break;
                }
                let delay = backoff.next_delay();
                warn!("MQTT error: {} (retry in {}ms)", e, delay.as_millis());
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            },
        }
    }
    debug!("MQTT driver stopped");
}

fn forward_command(
    topics: &Topics,
    commands: &mpsc::Sender<Command>,
    topic: &str,
    payload: &str,
) {
    let command = match topics.parse_command(topic, payload) {
        Ok(command) => command,
        Err(e) => {
            warn!("Ignoring {} '{}': {}", topic, payload, e);
            return;
        },
    };

    match commands.try_send(command) {
        Ok(()) => debug!("Command queued from {}", topic),
        Err(TrySendError::Full(command)) => warn!("Command queue full, dropped: {}", command),
        Err(TrySendError::Closed(_)) => debug!("Command queue closed"),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_max() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_millis() as u64).collect();

        for (delay, base) in delays.iter().zip([1000, 2000, 4000, 8000, 16000, 30000, 30000]) {
            assert!(*delay >= base && *delay <= base + base / 10, "{delay} vs {base}");
        }

        backoff.reset();
        assert!(backoff.next_delay() < Duration::from_millis(1101));
    }

    #[test]
    fn test_forward_command() {
        let (tx, mut rx) = mpsc::channel(1);
        let topics = Topics::default();

        forward_command(&topics, &tx, "rego600/set/key/1", "");
        assert_eq!(rx.try_recv().unwrap(), Command::PressKey(1));

        forward_command(&topics, &tx, "rego600/set/key/9", "");
        assert!(rx.try_recv().is_err());

        // Queue full: second command is dropped
        forward_command(&topics, &tx, "rego600/set/key/2", "");
        forward_command(&topics, &tx, "rego600/set/key/3", "");
        assert_eq!(rx.try_recv().unwrap(), Command::PressKey(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_will_is_retained_offline() {
        let topics = Topics::new("heatpump");
        let (_bus, eventloop) = MqttBus::new(&MqttConfig::default(), &topics);

        let will = eventloop.mqtt_options.last_will().unwrap();
        assert_eq!(will.topic, "heatpump/availability");
        assert_eq!(&will.message[..], b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[tokio::test]
    async fn test_publish_waits_in_client_queue() {
        let config = MqttConfig {
            capacity: 1,
            ..Default::default()
        };
        let (bus, _eventloop) = MqttBus::new(&config, &Topics::default());

        // Nothing polls the event loop: the message stays queued for a later session
        bus.publish(Message::data("rego600/sensor/Outdoor_GT2", "-3.5"))
            .await
            .unwrap();
        assert!(bus
            .client()
            .try_publish("rego600/sensor/Outdoor_GT2", QoS::AtMostOnce, false, "-3.6")
            .is_err());
    }

    #[test]
    fn test_default_config() {
        let config = MqttConfig::default();
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic_prefix, "rego600");
        assert_eq!(config.reconnect_max_ms, 30_000);
    }
}
