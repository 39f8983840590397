//! Service configuration
//!
//! Loaded in layers: defaults, `config/regosrv.yaml` (or `--config`), then
//! `REGOSRV_*` environment variables (`REGOSRV_MQTT__HOST=broker`).

use common::LoggingConfig;
use errors::{RegoError, RegoResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bus::MqttConfig;
use crate::core::energy::Integration;
use crate::core::poller::PollConfig;
use crate::core::protocol::EngineConfig;
use crate::core::registers::{resolve_profile, PumpProfile};
use crate::core::transport::SerialTransportConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "REGOSRV_";

/// Exchange discipline on the serial line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub retry_budget: u32,
    pub retry_backoff_ms: u64,
    pub response_timeout_ms: u64,
    pub fatal_threshold: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            retry_budget: engine.retry_budget,
            retry_backoff_ms: engine.retry_backoff.as_millis() as u64,
            response_timeout_ms: engine.response_timeout.as_millis() as u64,
            fatal_threshold: engine.fatal_threshold,
        }
    }
}

impl ProtocolConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            retry_budget: self.retry_budget,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            response_timeout: Duration::from_millis(self.response_timeout_ms),
            fatal_threshold: self.fatal_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Nominal capacity in kW: 4, 5, 7, 9, 14 or 16
    pub capacity_kw: u8,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self { capacity_kw: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    pub snapshot_path: PathBuf,
    pub persist_interval_secs: u64,
    /// Longer gaps between samples are not integrated
    pub max_gap_secs: u64,
    pub integration: Integration,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/energy_total.json"),
            persist_interval_secs: 600,
            max_gap_secs: 3600,
            integration: Integration::Trapezoidal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityConfig {
    pub heartbeat_secs: u64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self { heartbeat_secs: 30 }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegoConfig {
    pub serial: SerialTransportConfig,
    pub protocol: ProtocolConfig,
    pub mqtt: MqttConfig,
    pub pump: PumpConfig,
    pub polling: PollConfig,
    pub energy: EnergyConfig,
    pub availability: AvailabilityConfig,
    pub logging: LoggingConfig,
}

impl RegoConfig {
    pub fn load(path: &Path) -> RegoResult<Self> {
        common::config_loader::load_layered(path, ENV_PREFIX)
    }

    /// Check everything that can be checked before opening the serial port
    pub fn validate(&self) -> RegoResult<PumpProfile> {
        let profile = resolve_profile(self.pump.capacity_kw)?;

        self.serial
            .validate()
            .map_err(|e| RegoError::invalid_config("serial", e.to_string()))?;

        if self.protocol.retry_budget == 0 {
            return Err(RegoError::invalid_config(
                "protocol.retry_budget",
                "must be at least 1",
            ));
        }
        if self.protocol.response_timeout_ms == 0 {
            return Err(RegoError::invalid_config(
                "protocol.response_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.protocol.fatal_threshold == 0 {
            return Err(RegoError::invalid_config(
                "protocol.fatal_threshold",
                "must be at least 1",
            ));
        }

        if self.mqtt.host.is_empty() {
            return Err(RegoError::invalid_config("mqtt.host", "cannot be empty"));
        }
        if self.mqtt.topic_prefix.trim_matches('/').is_empty() {
            return Err(RegoError::invalid_config(
                "mqtt.topic_prefix",
                "cannot be empty",
            ));
        }
        if self.mqtt.reconnect_initial_ms == 0
            || self.mqtt.reconnect_max_ms < self.mqtt.reconnect_initial_ms
        {
            return Err(RegoError::invalid_config(
                "mqtt.reconnect_max_ms",
                "reconnect delays must satisfy 0 < initial <= max",
            ));
        }

        if self.polling.period_secs == 0 {
            return Err(RegoError::invalid_config(
                "polling.period_secs",
                "must be greater than 0",
            ));
        }
        if self.polling.slow_every == 0 {
            return Err(RegoError::invalid_config(
                "polling.slow_every",
                "must be at least 1",
            ));
        }
        if !(self.polling.budget_ratio > 0.0 && self.polling.budget_ratio <= 1.0) {
            return Err(RegoError::invalid_config(
                "polling.budget_ratio",
                "cycle budget must be within (0, 1] of the period",
            ));
        }

        if self.energy.persist_interval_secs == 0 {
            return Err(RegoError::invalid_config(
                "energy.persist_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.polling.display_interval_secs == 0 {
            return Err(RegoError::invalid_config(
                "polling.display_interval_secs",
                "must be greater than 0",
            ));
        }
        // Power samples may be up to two periods apart
        if self.energy.max_gap_secs <= 2 * self.polling.period_secs {
            return Err(RegoError::invalid_config(
                "energy.max_gap_secs",
                "must exceed twice polling.period_secs",
            ));
        }
        if self.availability.heartbeat_secs == 0 {
            return Err(RegoError::invalid_config(
                "availability.heartbeat_secs",
                "must be greater than 0",
            ));
        }

        Ok(profile)
    }
}
