//! Register catalog and pump profiles

pub mod catalog;
pub mod profile;

pub use catalog::{
    catalog, find, find_setting, AppliesTo, Bank, Category, Load, Rate, RegisterDescriptor,
    Scale, Unit, ENERGY_TOTAL_ID, KEY_REGISTERS, POWER_TOTAL_ID, WHEEL_REGISTER,
};
pub use profile::{
    active_registers, resolve_profile, PowerTable, PumpProfile, SUPPORTED_CAPACITIES,
};
