//! Mock Transport for Testing
//!
//! Scripted stand-in for the serial link. Each `send` arms the next scripted
//! reply (or asks the responder closure), which then becomes readable input.
//! Reads on an empty input buffer behave like a silent line: they wait for the
//! timeout and fail with [`TransportError::Timeout`].

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::traits::{hex_dump, Transport, TransportError, TransportStats};

/// Computes a reply for a request frame; `None` means the line stays silent
pub type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// One scripted reaction to a request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Bytes that become readable after the request
    Bytes(Vec<u8>),
    /// No answer at all
    Silence,
}

struct MockTransportState {
    connected: bool,
    fail_connect: bool,
    fail_send: bool,
    script: VecDeque<MockReply>,
    responder: Option<Responder>,
    input: VecDeque<u8>,
    sent: Vec<Vec<u8>>,
    /// Bytes handed out per read, to simulate fragmented replies
    chunk_size: Option<usize>,
    /// Time each send takes
    latency: Duration,
    closed: bool,
    stats: TransportStats,
}

/// Mock transport; clones share the same state
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
    read_timeout: Duration,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockTransportState {
                connected: true,
                fail_connect: false,
                fail_send: false,
                script: VecDeque::new(),
                responder: None,
                input: VecDeque::new(),
                sent: Vec::new(),
                chunk_size: None,
                latency: Duration::ZERO,
                closed: false,
                stats: TransportStats::default(),
            })),
            read_timeout: Duration::from_millis(500),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        // A panicking test thread must not hide the state from the others
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue the reply for the next request
    pub fn push_reply(&self, reply: MockReply) {
        self.lock().script.push_back(reply);
    }

    /// Queue raw reply bytes for the next request
    pub fn push_bytes(&self, bytes: Vec<u8>) {
        self.push_reply(MockReply::Bytes(bytes));
    }

    /// Fallback used when the script is empty
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Put bytes on the line that nobody asked for
    pub fn inject_noise(&self, bytes: &[u8]) {
        self.lock().input.extend(bytes.iter().copied());
    }

    pub fn set_chunk_size(&self, chunk_size: Option<usize>) {
        self.lock().chunk_size = chunk_size;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn set_connect_failure(&self, should_fail: bool) {
        self.lock().fail_connect = should_fail;
    }

    pub fn set_send_failure(&self, should_fail: bool) {
        self.lock().fail_send = should_fail;
    }

    /// Every frame written so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.fail_connect {
            state.stats.failed_opens += 1;
            return Err(TransportError::ConnectionFailed(
                "Mock connection failure".to_string(),
            ));
        }
        state.connected = true;
        state.closed = false;
        state.stats.opens += 1;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.connected = false;
        state.closed = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let latency = {
            let mut state = self.lock();
            if !state.connected {
                return Err(TransportError::SendFailed("Not connected".to_string()));
            }
            if state.fail_send {
                return Err(TransportError::SendFailed("Mock send failure".to_string()));
            }

            state.sent.push(data.to_vec());
            state.stats.bytes_sent += data.len() as u64;
            debug!("Mock TX: {}", hex_dump(data));

            let reply = match state.script.pop_front() {
                Some(reply) => reply,
                None => match state.responder.as_ref().and_then(|respond| respond(data)) {
                    Some(bytes) => MockReply::Bytes(bytes),
                    None => MockReply::Silence,
                },
            };
            if let MockReply::Bytes(bytes) = reply {
                state.input.extend(bytes);
            }
            state.latency
        };

        // Line time of the request/answer pair
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(data.len())
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let wait = timeout.unwrap_or(self.read_timeout);
        {
            let mut state = self.lock();
            if !state.connected {
                return Err(TransportError::ReceiveFailed("Not connected".to_string()));
            }

            if !state.input.is_empty() {
                let limit = state.chunk_size.unwrap_or(buffer.len()).min(buffer.len());
                let mut count = 0;
                while count < limit {
                    match state.input.pop_front() {
                        Some(byte) => {
                            buffer[count] = byte;
                            count += 1;
                        },
                        None => break,
                    }
                }
                state.stats.bytes_received += count as u64;
                return Ok(count);
            }
        }

        // Silent line
        tokio::time::sleep(wait).await;
        Err(TransportError::Timeout(format!(
            "No data within {:?}",
            wait
        )))
    }

    async fn clear_input(&mut self) -> Result<usize, TransportError> {
        let mut state = self.lock();
        let dropped = state.input.len();
        state.input.clear();
        state.stats.bytes_discarded += dropped as u64;
        Ok(dropped)
    }

    async fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn stats(&self) -> TransportStats {
        self.lock().stats
    }
}
