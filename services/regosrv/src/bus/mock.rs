//! Recording bus for tests

use async_trait::async_trait;
use errors::{RegoError, RegoResult};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BusClient, Message};

#[derive(Debug, Default)]
struct MockBusState {
    messages: Vec<Message>,
    disconnected: bool,
    fail_publish: bool,
}

/// Records every message; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<MockBusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockBusState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    /// Payloads published on `topic`, oldest first
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.state().messages.iter().map(|m| m.topic.clone()).collect()
    }

    pub fn clear(&self) {
        self.state().messages.clear();
    }

    pub fn is_disconnected(&self) -> bool {
        self.state().disconnected
    }

    pub fn set_publish_failure(&self, should_fail: bool) {
        self.state().fail_publish = should_fail;
    }
}

#[async_trait]
impl BusClient for MockBus {
    async fn publish(&self, message: Message) -> RegoResult<()> {
        let mut state = self.state();
        if state.fail_publish {
            return Err(RegoError::Bus("mock publish failure".to_string()));
        }
        state.messages.push(message);
        Ok(())
    }

    async fn disconnect(&self) -> RegoResult<()> {
        self.state().disconnected = true;
        Ok(())
    }
}
