//! Serial Transport Implementation
//!
//! RS-232 link to the Rego controller (19200 8N1 by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use super::traits::{hex_dump, Transport, TransportError, TransportStats};

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialTransportConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0")
    pub port: String,
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
    /// Flow control ("None", "Software", "Hardware")
    pub flow_control: String,
    /// Read timeout for individual operations
    pub read_timeout_ms: u64,
    /// Write timeout for individual operations
    pub write_timeout_ms: u64,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
            flow_control: "None".to_string(),
            read_timeout_ms: 500,
            write_timeout_ms: 500,
        }
    }
}

impl SerialTransportConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::ConfigError(
                "Port path cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(TransportError::ConfigError(
                "Baud rate must be greater than zero".to_string(),
            ));
        }

        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(TransportError::ConfigError(
                "Data bits must be 5, 6, 7, or 8".to_string(),
            ));
        }

        if ![1, 2].contains(&self.stop_bits) {
            return Err(TransportError::ConfigError(
                "Stop bits must be 1 or 2".to_string(),
            ));
        }

        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(TransportError::ConfigError(
                "Parity must be None, Even, or Odd".to_string(),
            ));
        }

        if !["None", "Software", "Hardware"].contains(&self.flow_control.as_str()) {
            return Err(TransportError::ConfigError(
                "Flow control must be None, Software, or Hardware".to_string(),
            ));
        }

        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(TransportError::ConfigError(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "Even" => tokio_serial::Parity::Even,
            "Odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    fn flow_control(&self) -> tokio_serial::FlowControl {
        match self.flow_control.as_str() {
            "Software" => tokio_serial::FlowControl::Software,
            "Hardware" => tokio_serial::FlowControl::Hardware,
            _ => tokio_serial::FlowControl::None,
        }
    }

    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }
}

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialTransport {
    config: SerialTransportConfig,
    connection: Option<SerialStream>,
    stats: TransportStats,
}

impl SerialTransport {
    pub fn new(config: SerialTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;

        Ok(Self {
            config,
            connection: None,
            stats: TransportStats::default(),
        })
    }

    /// Drop a broken port so the next exchange reopens it
    fn mark_broken(&mut self) {
        self.connection = None;
        self.stats.line_errors += 1;
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn transport_type(&self) -> &str {
        "serial"
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("Opening serial port: {}", self.config.port);

        let port_result = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.config.data_bits())
            .parity(self.config.parity())
            .stop_bits(self.config.stop_bits())
            .flow_control(self.config.flow_control())
            .timeout(self.config.read_timeout())
            .open_native_async();

        match port_result {
            Ok(mut port) => {
                #[cfg(unix)]
                port.set_exclusive(false).map_err(|e| {
                    TransportError::IoError(format!("Failed to set exclusive mode: {e}"))
                })?;

                self.connection = Some(port);
                self.stats.opens += 1;
                info!(
                    "Serial open: {} @ {} baud",
                    self.config.port, self.config.baud_rate
                );
                Ok(())
            },
            Err(e) => {
                let error_msg = format!("Failed to open serial port {}: {e}", self.config.port);
                error!("{error_msg}");
                self.stats.failed_opens += 1;
                Err(TransportError::ConnectionFailed(error_msg))
            },
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.connection.take().is_some() {
            // Port is closed on drop
            info!("Serial closed: {}", self.config.port);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        use tokio::io::AsyncWriteExt;

        let write_timeout = self.config.write_timeout();
        let Some(port) = self.connection.as_mut() else {
            return Err(TransportError::SendFailed(
                "Serial port not connected".to_string(),
            ));
        };

        let send_operation = async {
            port.write_all(data).await?;
            port.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };

        match timeout(write_timeout, send_operation).await {
            Ok(Ok(bytes_sent)) => {
                self.stats.bytes_sent += bytes_sent as u64;
                debug!(hex_data = %hex_dump(data), length = bytes_sent, direction = "send", "[Serial] Raw packet");
                Ok(bytes_sent)
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to send data: {e}");
                error!("{error_msg}");
                self.mark_broken();
                Err(TransportError::SendFailed(error_msg))
            },
            Err(_) => {
                let error_msg = format!("Send timed out after {write_timeout:?}");
                warn!("{error_msg}");
                Err(TransportError::Timeout(error_msg))
            },
        }
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout_duration: Option<Duration>,
    ) -> Result<usize, TransportError> {
        use tokio::io::AsyncReadExt;

        let receive_timeout = timeout_duration.unwrap_or(self.config.read_timeout());
        let Some(port) = self.connection.as_mut() else {
            return Err(TransportError::ReceiveFailed(
                "Serial port not connected".to_string(),
            ));
        };

        match timeout(receive_timeout, port.read(buffer)).await {
            Ok(Ok(0)) => Err(TransportError::ConnectionLost(
                "Serial port returned end of stream".to_string(),
            )),
            Ok(Ok(bytes_read)) => {
                self.stats.bytes_received += bytes_read as u64;
                debug!(hex_data = %hex_dump(&buffer[..bytes_read]), length = bytes_read, direction = "recv", "[Serial] Raw packet");
                Ok(bytes_read)
            },
            Ok(Err(e)) => {
                let error_msg = format!("Failed to receive data: {e}");
                error!("{error_msg}");
                self.mark_broken();
                Err(TransportError::ReceiveFailed(error_msg))
            },
            Err(_) => {
                // Expected while the controller is silent
                let error_msg = format!("Receive timed out after {receive_timeout:?}");
                debug!("{error_msg}");
                Err(TransportError::Timeout(error_msg))
            },
        }
    }

    async fn clear_input(&mut self) -> Result<usize, TransportError> {
        let Some(port) = self.connection.as_mut() else {
            return Err(TransportError::SendFailed(
                "Serial port not connected".to_string(),
            ));
        };

        let pending = port.bytes_to_read().unwrap_or(0) as usize;
        port.clear(ClearBuffer::Input)
            .map_err(|e| TransportError::IoError(format!("Failed to clear input: {e}")))?;

        if pending > 0 {
            self.stats.bytes_discarded += pending as u64;
            debug!("Discarded {} stale bytes", pending);
        }
        Ok(pending)
    }

    async fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn stats(&self) -> TransportStats {
        self.stats
    }
}
