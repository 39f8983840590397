//! Transport Layer Traits
//!
//! Byte-stream interface between the Rego protocol engine and the physical
//! link. The engine only sees `send`, `receive` and `clear_input`; framing,
//! checksums and retries live above this layer.

use async_trait::async_trait;
use errors::RegoError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection lost
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<TransportError> for RegoError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => RegoError::Timeout(msg),
            TransportError::ConfigError(msg) => RegoError::Configuration(msg),
            other => RegoError::Transport(other.to_string()),
        }
    }
}

/// Line counters, reported when the port is closed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Stale input dropped before a request
    pub bytes_discarded: u64,
    pub opens: u64,
    pub failed_opens: u64,
    /// Ports dropped after an I/O error
    pub line_errors: u64,
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes out, {} bytes in, {} discarded, {} opens ({} failed), {} line errors",
            self.bytes_sent,
            self.bytes_received,
            self.bytes_discarded,
            self.opens,
            self.failed_opens,
            self.line_errors
        )
    }
}

/// Core transport trait for the half-duplex serial link
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn transport_type(&self) -> &str;

    /// Open the link
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the link; closing an already closed link is not an error
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Write a complete frame, returning the number of bytes written
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read whatever is available into `buffer`
    ///
    /// Waits at most `timeout` (or the configured read timeout) for the first
    /// byte and returns [`TransportError::Timeout`] when nothing arrives.
    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    /// Discard unread input, returning how many bytes were dropped when known
    async fn clear_input(&mut self) -> Result<usize, TransportError>;

    async fn is_connected(&self) -> bool;

    /// Counters since the transport was created
    async fn stats(&self) -> TransportStats;

    /// Close the transport and release the device
    async fn close(&mut self) -> Result<(), TransportError> {
        self.disconnect().await
    }
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    fn transport_type(&self) -> &str {
        self.as_ref().transport_type()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.as_mut().connect().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.as_mut().disconnect().await
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.as_mut().send(data).await
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        self.as_mut().receive(buffer, timeout).await
    }

    async fn clear_input(&mut self) -> Result<usize, TransportError> {
        self.as_mut().clear_input().await
    }

    async fn is_connected(&self) -> bool {
        self.as_ref().is_connected().await
    }

    async fn stats(&self) -> TransportStats {
        self.as_ref().stats().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.as_mut().close().await
    }
}

/// Hex dump used for raw frame logging
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
