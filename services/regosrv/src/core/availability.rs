//! Availability state machine
//!
//! Tracks the bus session and owns the `online`/`offline` signal:
//!
//! ```text
//! Disconnected --ConnectStarted--> Connecting --Connected--> Online
//!                                  Connecting --ConnectFailed--> Connecting
//! Online --ConnectionLost--> Reconnecting --Connected--> Online
//!                            Reconnecting --ConnectFailed--> Reconnecting
//! Connecting | Online | Reconnecting --ShutdownRequested--> Disconnected
//! ```
//!
//! Entering `Online` enqueues `online` before the new state is visible, so
//! data gated on `Online` always follows the announcement of its session.

use errors::{RegoError, RegoResult};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{LinkEvent, Message, SharedBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AvailabilityState {
    Disconnected,
    Connecting,
    Online,
    Reconnecting,
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityEvent {
    ConnectStarted,
    Connected,
    ConnectFailed,
    ConnectionLost,
    HeartbeatTick,
    ShutdownRequested,
}

impl fmt::Display for AvailabilityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityAction {
    PublishOnline,
    PublishOffline,
}

/// Pure transition table
pub fn transition(
    state: AvailabilityState,
    event: AvailabilityEvent,
) -> RegoResult<(AvailabilityState, Option<AvailabilityAction>)> {
    use AvailabilityAction::*;
    use AvailabilityEvent::*;
    use AvailabilityState::*;

    let next = match (state, event) {
        (Disconnected, ConnectStarted) => (Connecting, None),
        (Connecting, Connected) | (Reconnecting, Connected) => (Online, Some(PublishOnline)),
        (Connecting, ConnectFailed) => (Connecting, None),
        (Reconnecting, ConnectFailed) => (Reconnecting, None),
        (Online, ConnectionLost) => (Reconnecting, None),
        (Online, HeartbeatTick) => (Online, Some(PublishOnline)),
        // Nobody is listening while the session is down
        (Connecting | Reconnecting, HeartbeatTick) => (state, None),
        (Online, ShutdownRequested) => (Disconnected, Some(PublishOffline)),
        (Connecting | Reconnecting, ShutdownRequested) => (Disconnected, None),
        _ => {
            return Err(RegoError::InvalidState {
                from: state.to_string(),
                event: event.to_string(),
            })
        },
    };
    Ok(next)
}

#[derive(Debug)]
pub struct AvailabilityMachine {
    state: AvailabilityState,
    tx: watch::Sender<AvailabilityState>,
    bus: SharedBus,
    topic: String,
}

impl AvailabilityMachine {
    pub fn new(bus: SharedBus, topic: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(AvailabilityState::Disconnected);
        Self {
            state: AvailabilityState::Disconnected,
            tx,
            bus,
            topic: topic.into(),
        }
    }

    pub fn state(&self) -> AvailabilityState {
        self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<AvailabilityState> {
        self.tx.subscribe()
    }

    pub async fn handle(&mut self, event: AvailabilityEvent) -> RegoResult<AvailabilityState> {
        let (next, action) = transition(self.state, event)?;
        if next != self.state {
            info!("Availability: {} -> {} ({})", self.state, next, event);
        }

        match action {
            Some(AvailabilityAction::PublishOnline) => {
                self.announce(true).await;
                self.set(next);
            },
            Some(AvailabilityAction::PublishOffline) => {
                // Stop data first so nothing follows the offline message
                self.set(next);
                self.announce(false).await;
            },
            None => self.set(next),
        }
        Ok(next)
    }

    /// Map a link event onto the machine, given the current state
    pub async fn handle_link(&mut self, link: LinkEvent) -> RegoResult<AvailabilityState> {
        let event = match (link, self.state) {
            (LinkEvent::Connecting, _) => AvailabilityEvent::ConnectStarted,
            (LinkEvent::Up, _) => AvailabilityEvent::Connected,
            (LinkEvent::Down, AvailabilityState::Online) => AvailabilityEvent::ConnectionLost,
            (LinkEvent::Down, _) => AvailabilityEvent::ConnectFailed,
        };
        self.handle(event).await
    }

    fn set(&mut self, next: AvailabilityState) {
        self.state = next;
        self.tx.send_replace(next);
    }

    async fn announce(&self, online: bool) {
        let message = Message::availability(&self.topic, online);
        match self.bus.publish(message).await {
            Ok(()) => debug!("Availability published: {}", if online { "online" } else { "offline" }),
            Err(e) => warn!("Availability publish failed: {}", e),
        }
    }
}

/// Availability service: link events, heartbeat and the final `offline`
pub async fn run_availability(
    mut machine: AvailabilityMachine,
    mut links: mpsc::Receiver<LinkEvent>,
    heartbeat: Duration,
    cancel: CancellationToken,
) -> AvailabilityState {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut links_open = true;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            link = links.recv(), if links_open => match link {
                Some(link) => {
                    if let Err(e) = machine.handle_link(link).await {
                        warn!("Ignoring link event {:?}: {}", link, e);
                    }
                },
                None => links_open = false,
            },
            _ = ticker.tick() => {
                if let Err(e) = machine.handle(AvailabilityEvent::HeartbeatTick).await {
                    debug!("Heartbeat ignored: {}", e);
                }
            }
        }
    }

    if machine.state() != AvailabilityState::Disconnected {
        if let Err(e) = machine.handle(AvailabilityEvent::ShutdownRequested).await {
            warn!("Shutdown transition rejected: {}", e);
        }
    }
    machine.state()
}
