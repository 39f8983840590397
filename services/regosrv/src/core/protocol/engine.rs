//! Serial protocol engine
//!
//! Owns the request/response discipline of the half-duplex line: one
//! exchange at a time, stale input cleared before every request, answers
//! validated before decoding, transient failures retried with a short
//! backoff. Readings that cannot be obtained within the retry budget are
//! returned as invalid; a run of exhausted exchanges on distinct requests
//! escalates to [`RegoError::FatalTransport`].

use chrono::{DateTime, Utc};
use errors::{RegoError, RegoResult};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::codec::{FrameCodec, Request, Response};
use super::command::Command;
use super::exchange::{Exchange, ExchangePhase};
use crate::core::registers::RegisterDescriptor;
use crate::core::transport::{SharedTransport, Transport, TransportError};

/// Latest value of one register
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterReading {
    pub descriptor_id: u16,
    pub raw_value: Option<i32>,
    pub decoded_value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
}

impl RegisterReading {
    pub fn valid(descriptor: &RegisterDescriptor, raw: i32, timestamp: DateTime<Utc>) -> Self {
        Self {
            descriptor_id: descriptor.id,
            raw_value: Some(raw),
            decoded_value: Some(descriptor.scale.decode(raw)),
            timestamp,
            valid: true,
        }
    }

    /// Stale reading: carries no value at all
    pub fn invalid(descriptor: &RegisterDescriptor, timestamp: DateTime<Utc>) -> Self {
        Self {
            descriptor_id: descriptor.id,
            raw_value: None,
            decoded_value: None,
            timestamp,
            valid: false,
        }
    }
}

/// Text of one display row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayReading {
    pub row: u8,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attempts per exchange
    pub retry_budget: u32,
    pub retry_backoff: Duration,
    /// Upper bound for a complete answer to arrive
    pub response_timeout: Duration,
    /// Exhausted distinct requests in a row that make the link unusable
    pub fatal_threshold: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            retry_backoff: Duration::from_millis(50),
            response_timeout: Duration::from_millis(500),
            fatal_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub exchanges: u64,
    pub retries: u64,
    pub exhausted: u64,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exchanges, {} retries, {} exhausted",
            self.exchanges, self.retries, self.exhausted
        )
    }
}

#[derive(Debug)]
pub struct SerialProtocolEngine {
    transport: SharedTransport,
    codec: Arc<dyn FrameCodec>,
    config: EngineConfig,
    /// Distinct requests exhausted since the last success
    failing: HashSet<Request>,
    stats: EngineStats,
}

impl SerialProtocolEngine {
    pub fn new(transport: SharedTransport, codec: Arc<dyn FrameCodec>, config: EngineConfig) -> Self {
        Self {
            transport,
            codec,
            config,
            failing: HashSet::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Number of distinct requests currently failing in a row
    pub fn consecutive_failures(&self) -> usize {
        self.failing.len()
    }

    pub async fn read_register(
        &mut self,
        descriptor: &'static RegisterDescriptor,
    ) -> RegoResult<RegisterReading> {
        if !descriptor.is_polled() {
            return Err(RegoError::Internal(format!(
                "{} is not a controller register",
                descriptor
            )));
        }

        let request = Request::ReadRegister {
            bank: descriptor.bank,
            register: descriptor.id,
        };
        let response = self.exchange(&request).await?;
        let now = Utc::now();

        Ok(match response {
            Some(Response::Value(raw)) => RegisterReading::valid(descriptor, raw, now),
            _ => RegisterReading::invalid(descriptor, now),
        })
    }

    pub async fn read_display_row(&mut self, row: u8) -> RegoResult<DisplayReading> {
        let response = self.exchange(&Request::ReadDisplay { row }).await?;
        let timestamp = Utc::now();

        Ok(match response {
            Some(Response::Text(text)) => DisplayReading {
                row,
                text: Some(text),
                timestamp,
                valid: true,
            },
            _ => DisplayReading {
                row,
                text: None,
                timestamp,
                valid: false,
            },
        })
    }

    /// Run a control command; `Ok(false)` when no acknowledgement arrived
    pub async fn execute(&mut self, command: &Command) -> RegoResult<bool> {
        let acknowledged = matches!(
            self.exchange(&command.to_request()).await?,
            Some(Response::Ack)
        );
        if !acknowledged {
            warn!("Command not acknowledged: {}", command);
        }
        Ok(acknowledged)
    }

    /// One exchange with retries
    ///
    /// `Ok(None)` when the retry budget is spent; `Err` only for fatal or
    /// non-retryable problems.
    async fn exchange(&mut self, request: &Request) -> RegoResult<Option<Response>> {
        let frame = self.codec.encode(request)?;
        let expected_len = self.codec.response_len(request);
        let mut exchange = Exchange::new(self.config.retry_budget);
        self.stats.exchanges += 1;

        // Owner token: held from the first write to the final read
        let transport = Arc::clone(&self.transport);
        let mut line = transport.lock().await;

        loop {
            let outcome = match self.attempt(&mut line, &frame, expected_len).await {
                Ok(reply) => {
                    exchange.sent()?;
                    self.codec.decode(request, &reply)
                },
                Err(AttemptError::Send(e)) => Err(e),
                Err(AttemptError::Receive(e)) => {
                    exchange.sent()?;
                    Err(e)
                },
            };

            match outcome {
                Ok(response) => {
                    exchange.completed()?;
                    self.failing.clear();
                    return Ok(Some(response));
                },
                Err(e) if e.is_transient() => {
                    debug!(
                        request = %request,
                        attempt = exchange.attempt(),
                        budget = exchange.budget(),
                        "Exchange failed: {}",
                        e
                    );
                    match exchange.failed()? {
                        ExchangePhase::BackingOff => {
                            self.stats.retries += 1;
                            tokio::time::sleep(self.config.retry_backoff).await;
                            exchange.retry()?;
                        },
                        _ => {
                            warn!(
                                request = %request,
                                attempts = exchange.attempt(),
                                "Retries exhausted: {}",
                                e
                            );
                            return self.exhausted(request).map(|()| None);
                        },
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn exhausted(&mut self, request: &Request) -> RegoResult<()> {
        self.stats.exhausted += 1;
        self.failing.insert(*request);

        let failing = self.failing.len() as u32;
        if failing >= self.config.fatal_threshold {
            error!(
                "Serial link unusable: {} distinct requests failed in a row",
                failing
            );
            return Err(RegoError::FatalTransport(format!(
                "{failing} distinct requests exhausted their retry budget in a row"
            )));
        }
        Ok(())
    }

    /// Write the frame and collect the answer
    async fn attempt(
        &self,
        line: &mut Box<dyn Transport>,
        frame: &[u8],
        expected_len: usize,
    ) -> Result<Vec<u8>, AttemptError> {
        if !line.is_connected().await {
            debug!("Serial link closed, reopening");
            line.connect().await.map_err(AttemptError::send)?;
        }

        line.clear_input().await.map_err(AttemptError::send)?;
        line.send(frame).await.map_err(AttemptError::send)?;

        let deadline = Instant::now() + self.config.response_timeout;
        let mut reply = vec![0u8; expected_len];
        let mut filled = 0;

        while filled < expected_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match line.receive(&mut reply[filled..], Some(remaining)).await {
                Ok(n) => filled += n,
                Err(TransportError::Timeout(_)) => break,
                Err(e) => return Err(AttemptError::Receive(e.into())),
            }
        }

        if filled == 0 {
            return Err(AttemptError::Receive(RegoError::Timeout(format!(
                "no answer within {:?}",
                self.config.response_timeout
            ))));
        }

        // A short frame is reported by the codec's length check
        reply.truncate(filled);
        Ok(reply)
    }
}

/// Where in the attempt a failure happened
enum AttemptError {
    Send(RegoError),
    Receive(RegoError),
}

impl AttemptError {
    fn send(err: TransportError) -> Self {
        AttemptError::Send(err.into())
    }
}
