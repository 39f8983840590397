//! Rego 600/635 Heat Pump Gateway (regosrv)
//!
//! Bridges the half-duplex serial register protocol of the Rego 600/635
//! heat-pump controller to an MQTT broker.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ PollScheduler │──►│ SerialProtocol   │──►│  Transport   │──► RS-232
//! │ (cycle, cmds) │   │ Engine (retries) │   │  (serial)    │
//! └───────────────┘   └──────────────────┘   └──────────────┘
//!         │
//!         ├──► PowerModel ──► EnergyAccumulator ──► snapshot file
//!         ▼
//! ┌───────────────┐   ┌──────────────────┐
//! │   Publisher   │──►│   MQTT driver    │──► broker
//! │ (gated)       │   │   (rumqttc)      │
//! └───────────────┘   └──────────────────┘
//!         ▲                    │ link events
//!         └── Availability ◄───┘
//! ```
//!
//! - **`core::transport`**: serial link behind the [`core::transport::Transport`] trait
//! - **`core::protocol`**: frame codec, exchange lifecycle, engine, commands
//! - **`core::registers`**: static register catalog and pump profiles
//! - **`core::poller`**: the poll loop, sole owner of the serial line
//! - **`core::energy`**: power model, energy integration and persistence
//! - **`core::availability`**: online/offline state machine
//! - **`bus`**: topics, publisher and the MQTT client

pub mod bus;
pub mod config;
pub mod core;
pub mod runtime;

pub use config::RegoConfig;
pub use runtime::{DriverHandle, Gateway};
