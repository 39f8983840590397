//! Topic layout and payload formatting
//!
//! ```text
//! <prefix>/availability            online | offline
//! <prefix>/sensor/<Key>            temperatures, binary states, add-heat %
//! <prefix>/led/<Key>               front panel LEDs
//! <prefix>/setting/<key>           settings
//! <prefix>/display/Row_<n>         display rows
//! <prefix>/power/<load>|total      W
//! <prefix>/energy/total            kWh
//! <prefix>/set/setting/<key>       write a setting
//! <prefix>/set/key/<1|2|3>         press a front panel key
//! <prefix>/set/key/wheel_left|wheel_right
//! ```

use errors::{RegoError, RegoResult};

use crate::core::protocol::{Command, WheelDirection};
use crate::core::registers::{find_setting, Bank, Category, Load, RegisterDescriptor, Unit};

pub const DEFAULT_PREFIX: &str = "rego600";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn availability(&self) -> String {
        format!("{}/availability", self.prefix)
    }

    pub fn power(&self, load: Load) -> String {
        format!("{}/power/{}", self.prefix, load.key())
    }

    pub fn power_total(&self) -> String {
        format!("{}/power/total", self.prefix)
    }

    pub fn energy_total(&self) -> String {
        format!("{}/energy/total", self.prefix)
    }

    /// Subscription filter for control commands
    pub fn command_filter(&self) -> String {
        format!("{}/set/#", self.prefix)
    }

    /// Topic a descriptor's value is published on
    pub fn for_descriptor(&self, descriptor: &RegisterDescriptor) -> String {
        let group = match (descriptor.category, descriptor.bank, descriptor.unit) {
            (Category::Binary, Bank::FrontPanel, _) => "led",
            (Category::Setting, _, _) => "setting",
            (Category::DisplayRow, _, _) => "display",
            (Category::PowerDerived, _, Unit::KilowattHour) => "energy",
            (Category::PowerDerived, _, _) => "power",
            _ => "sensor",
        };
        format!("{}/{}/{}", self.prefix, group, descriptor.key)
    }

    /// Translate an incoming `set` message into a command
    pub fn parse_command(&self, topic: &str, payload: &str) -> RegoResult<Command> {
        let path = topic
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix("/set/"))
            .ok_or_else(|| unknown(topic))?;

        match path.split_once('/') {
            Some(("setting", key)) => {
                let descriptor = find_setting(key).ok_or_else(|| unknown(topic))?;
                let value: f64 = payload.trim().parse().map_err(|_| {
                    RegoError::invalid_config(topic, format!("payload '{payload}' is not a number"))
                })?;
                Command::write_setting(descriptor, value)
            },
            Some(("key", "wheel_left")) => Ok(Command::TurnWheel(WheelDirection::Left)),
            Some(("key", "wheel_right")) => Ok(Command::TurnWheel(WheelDirection::Right)),
            Some(("key", key)) => {
                let key: u8 = key.parse().map_err(|_| unknown(topic))?;
                Command::press_key(key)
            },
            _ => Err(unknown(topic)),
        }
    }
}

fn unknown(topic: &str) -> RegoError {
    RegoError::invalid_config(topic, "unknown command topic")
}

/// Payload text for a decoded value
///
/// Unscaled registers are integers on the wire and stay integers; scaled
/// ones carry one decimal.
pub fn format_value(descriptor: &RegisterDescriptor, value: f64) -> String {
    if descriptor.scale.is_unit() {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    }
}

pub fn format_energy(kwh: f64) -> String {
    format!("{kwh:.3}")
}
