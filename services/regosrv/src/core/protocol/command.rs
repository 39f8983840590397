//! Control commands
//!
//! Commands arrive from the bus and are executed by the poll loop between
//! two reads, so they share the serial line discipline with everything else.

use errors::{RegoError, RegoResult};
use std::fmt;

use super::codec::Request;
use crate::core::registers::{Bank, RegisterDescriptor, KEY_REGISTERS, WHEEL_REGISTER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Write a raw value to a setting register
    WriteSetting {
        descriptor: &'static RegisterDescriptor,
        raw: i16,
    },
    /// Press front panel key 1..=3
    PressKey(u8),
    TurnWheel(WheelDirection),
}

impl Command {
    /// Setting write from an engineering value (e.g. `21.5` °C)
    pub fn write_setting(descriptor: &'static RegisterDescriptor, value: f64) -> RegoResult<Self> {
        if !descriptor.is_writable() {
            return Err(RegoError::invalid_config(
                descriptor.key,
                "register is not a writable setting",
            ));
        }
        if !value.is_finite() {
            return Err(RegoError::invalid_config(descriptor.key, "value is not a number"));
        }

        let raw = descriptor.scale.encode(value);
        if raw < f64::from(i16::MIN)
            || raw > f64::from(i16::MAX)
            || !descriptor.accepts(raw as i16)
        {
            return Err(RegoError::invalid_config(
                descriptor.key,
                format!("value {value} out of range"),
            ));
        }

        Ok(Command::WriteSetting {
            descriptor,
            raw: raw as i16,
        })
    }

    pub fn press_key(key: u8) -> RegoResult<Self> {
        if !(1..=3).contains(&key) {
            return Err(RegoError::invalid_config(
                "key",
                format!("front panel key {key} does not exist"),
            ));
        }
        Ok(Command::PressKey(key))
    }

    pub fn to_request(&self) -> Request {
        match self {
            Command::WriteSetting { descriptor, raw } => Request::Write {
                bank: Bank::System,
                register: descriptor.id,
                value: *raw,
            },
            Command::PressKey(key) => Request::Write {
                bank: Bank::FrontPanel,
                register: KEY_REGISTERS[usize::from(key.saturating_sub(1)).min(2)],
                value: 1,
            },
            Command::TurnWheel(direction) => Request::Write {
                bank: Bank::FrontPanel,
                register: WHEEL_REGISTER,
                value: match direction {
                    WheelDirection::Left => -1,
                    WheelDirection::Right => 1,
                },
            },
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::WriteSetting { descriptor, raw } => {
                write!(f, "set {} = {}", descriptor.key, descriptor.scale.decode(i32::from(*raw)))
            },
            Command::PressKey(key) => write!(f, "press key {}", key),
            Command::TurnWheel(WheelDirection::Left) => write!(f, "turn wheel left"),
            Command::TurnWheel(WheelDirection::Right) => write!(f, "turn wheel right"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::registers::find_setting;

    #[test]
    fn test_setting_value_is_scaled() {
        let indoor = find_setting("indoor_temp_setting").unwrap();
        let command = Command::write_setting(indoor, 21.5).unwrap();
        assert_eq!(
            command.to_request(),
            Request::Write {
                bank: Bank::System,
                register: 0x0021,
                value: 215
            }
        );
        assert_eq!(command.to_string(), "set indoor_temp_setting = 21.5");
    }

    #[test]
    fn test_setting_range_checked() {
        let curve = find_setting("heat_curve").unwrap();
        assert!(Command::write_setting(curve, 5000.0).is_err());
        assert!(Command::write_setting(curve, f64::NAN).is_err());

        // Controller limits per setting
        assert!(Command::write_setting(curve, 100.0).is_err());
        assert!(Command::write_setting(curve, 10.0).is_ok());
        assert!(Command::write_setting(curve, -0.1).is_err());

        let indoor = find_setting("indoor_temp_setting").unwrap();
        assert!(Command::write_setting(indoor, 35.0).is_err());
        assert!(Command::write_setting(indoor, 9.9).is_err());
        assert!(Command::write_setting(indoor, 10.0).is_ok());

        let coupling = find_setting("heat_curve_coupling_diff").unwrap();
        assert!(Command::write_setting(coupling, 15.0).is_ok());
        assert!(Command::write_setting(coupling, 15.5).is_err());
    }

    #[test]
    fn test_front_panel_requests() {
        assert_eq!(
            Command::press_key(2).unwrap().to_request(),
            Request::Write {
                bank: Bank::FrontPanel,
                register: 0x000A,
                value: 1
            }
        );
        assert!(Command::press_key(4).is_err());
        assert_eq!(
            Command::TurnWheel(WheelDirection::Left).to_request(),
            Request::Write {
                bank: Bank::FrontPanel,
                register: 0x0044,
                value: -1
            }
        );
    }
}
