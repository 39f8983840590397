//! Gateway basic library
//!
//! Provides functions shared by the gateway service, including:
//! - logging initialization
//! - layered configuration loading
//! - startup arguments and banner
//! - graceful shutdown signals

pub mod bootstrap_args;
pub mod config_loader;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use bootstrap_args::ServiceArgs;
pub use logging::{LogConfig, LoggingConfig};
pub use service_bootstrap::ServiceInfo;

// Re-export common dependencies
pub use anyhow;
pub use serde;
pub use serde_json;
pub use tokio;

// Re-export CLI dependencies when cli feature is enabled
#[cfg(feature = "cli")]
pub use clap;

// Re-export clap derive macros separately for proper macro resolution
#[cfg(feature = "cli")]
pub use clap::Parser;
