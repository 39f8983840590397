//! Publish/subscribe bus
//!
//! [`BusClient`] is the seam between the gateway and the broker. The MQTT
//! implementation drives a `rumqttc` event loop; the mock records messages
//! for tests.

pub mod mock;
pub mod mqtt;
pub mod publisher;
pub mod topics;

use async_trait::async_trait;
use errors::RegoResult;
use std::fmt;
use std::sync::Arc;

pub use mock::MockBus;
pub use mqtt::{run_driver, LinkEvent, MqttBus, MqttConfig};
pub use publisher::Publisher;
pub use topics::Topics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
}

/// One outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
    pub qos: QosLevel,
}

impl Message {
    /// Retained telemetry value
    pub fn data(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: true,
            qos: QosLevel::AtMostOnce,
        }
    }

    /// Retained, acknowledged availability message
    pub fn availability(topic: impl Into<String>, online: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: if online { "online" } else { "offline" }.to_string(),
            retain: true,
            qos: QosLevel::AtLeastOnce,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.topic, self.payload)
    }
}

/// Outgoing side of the bus
///
/// `publish` enqueues in order; messages enqueued earlier reach the broker
/// first.
#[async_trait]
pub trait BusClient: Send + Sync + fmt::Debug {
    async fn publish(&self, message: Message) -> RegoResult<()>;

    /// Close the session cleanly (no last will)
    async fn disconnect(&self) -> RegoResult<()>;
}

pub type SharedBus = Arc<dyn BusClient>;
