//! Unified error handling for the Rego gateway
//!
//! Every crate in the workspace reports failures through [`RegoError`]. The
//! variants follow the gateway's failure taxonomy: transient protocol errors
//! are handled inside the protocol engine, fatal transport errors travel to
//! the process boundary, configuration errors stop startup, persistence and
//! bus errors are recovered locally.

use thiserror::Error;

// ============================================================================
// RegoError - Main error type
// ============================================================================

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum RegoError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Protocol & Communication Errors
    // ======================================
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    Checksum { expected: u8, actual: u8 },

    #[error("Timeout waiting for response: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Fatal transport error: {0}")]
    FatalTransport(String),

    // ======================================
    // Bus Errors
    // ======================================
    #[error("Bus error: {0}")]
    Bus(String),

    // ======================================
    // Persistence Errors
    // ======================================
    #[error("Persistence error: {path}: {reason}")]
    Persistence { path: String, reason: String },

    // ======================================
    // State Errors
    // ======================================
    #[error("Invalid state transition: {from} -> {event}")]
    InvalidState { from: String, event: String },

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using RegoError
pub type RegoResult<T> = Result<T, RegoError>;

impl RegoError {
    /// Errors that the protocol engine retries locally
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::Checksum { .. } | Self::Timeout(_) | Self::Transport(_)
        )
    }

    /// Errors that must reach the process boundary
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalTransport(_) | Self::Configuration(_) | Self::InvalidConfig { .. }
        )
    }

    /// Stable error code for log correlation
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Checksum { .. } => "CHECKSUM_MISMATCH",
            Self::Timeout(_) => "TIMEOUT",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::FatalTransport(_) => "FATAL_TRANSPORT",
            Self::Bus(_) => "BUS_ERROR",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    pub fn persistence(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for RegoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<figment::Error> for RegoError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::RegoError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::RegoError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! protocol_error {
    ($msg:expr) => {
        $crate::RegoError::Protocol($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::RegoError::Protocol(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RegoError::Timeout("no reply".into()).is_transient());
        assert!(RegoError::Checksum {
            expected: 0x10,
            actual: 0x11
        }
        .is_transient());
        assert!(!RegoError::FatalTransport("dead link".into()).is_transient());
        assert!(!RegoError::Bus("broker gone".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RegoError::FatalTransport("dead link".into()).is_fatal());
        assert!(config_error!("capacity {} unsupported", 11).is_fatal());
        assert!(!RegoError::persistence("energy.json", "corrupt").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RegoError::Checksum {
            expected: 0x0A,
            actual: 0x0B,
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x0A, got 0x0B");
        assert_eq!(err.error_code(), "CHECKSUM_MISMATCH");

        let err = protocol_error!("unexpected address {:#04X}", 0x81);
        assert!(err.to_string().contains("0x81"));
    }
}
