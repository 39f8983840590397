//! Telemetry publisher
//!
//! Data goes out only while the availability state is `Online`; anything
//! produced in another state is dropped and re-read next cycle.

use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::topics::{format_energy, format_value, Topics};
use super::{Message, SharedBus};
use crate::core::availability::AvailabilityState;
use crate::core::energy::PowerBreakdown;
use crate::core::protocol::{DisplayReading, RegisterReading};
use crate::core::registers::{find, Bank, RegisterDescriptor};

#[derive(Debug)]
pub struct Publisher {
    bus: SharedBus,
    topics: Topics,
    availability: watch::Receiver<AvailabilityState>,
    /// Last text actually published per display row
    last_display: HashMap<u8, String>,
    published: u64,
    dropped: u64,
}

impl Publisher {
    pub fn new(
        bus: SharedBus,
        topics: Topics,
        availability: watch::Receiver<AvailabilityState>,
    ) -> Self {
        Self {
            bus,
            topics,
            availability,
            last_display: HashMap::new(),
            published: 0,
            dropped: 0,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn is_live(&self) -> bool {
        *self.availability.borrow() == AvailabilityState::Online
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Returns whether the message reached the bus client
    async fn send(&mut self, message: Message) -> bool {
        if !self.is_live() {
            self.dropped += 1;
            debug!("Not online, dropped {}", message);
            return false;
        }
        match self.bus.publish(message).await {
            Ok(()) => {
                self.published += 1;
                true
            },
            Err(e) => {
                warn!("Publish failed: {}", e);
                false
            },
        }
    }

    /// Publish a valid reading; stale readings are never forwarded
    pub async fn reading(&mut self, descriptor: &RegisterDescriptor, reading: &RegisterReading) {
        let Some(value) = reading.decoded_value.filter(|_| reading.valid) else {
            return;
        };
        let message = Message::data(
            self.topics.for_descriptor(descriptor),
            format_value(descriptor, value),
        );
        self.send(message).await;
    }

    /// Publish a display row when its text changed
    pub async fn display(&mut self, reading: &DisplayReading) {
        let Some(text) = reading.text.as_ref().filter(|_| reading.valid) else {
            return;
        };
        if self.last_display.get(&reading.row) == Some(text) {
            return;
        }
        let Some(descriptor) = find(Bank::Display, u16::from(reading.row)) else {
            return;
        };

        let message = Message::data(self.topics.for_descriptor(descriptor), text.clone());
        if self.send(message).await {
            self.last_display.insert(reading.row, text.clone());
        }
    }

    pub async fn power(&mut self, power: &PowerBreakdown) {
        for (load, watts) in &power.loads {
            let message = Message::data(self.topics.power(*load), watts.to_string());
            self.send(message).await;
        }
        let message = Message::data(self.topics.power_total(), power.total_w.to_string());
        self.send(message).await;
    }

    pub async fn energy(&mut self, kwh: f64) {
        let message = Message::data(self.topics.energy_total(), format_energy(kwh));
        self.send(message).await;
    }
}
