//! Pump profile resolution
//!
//! The configured nominal capacity selects the auxiliary-stage labels, the
//! nominal power of every electrical load and the active register subset.

use errors::{config_error, RegoResult};
use serde::Serialize;

use super::catalog::{catalog, AppliesTo, Load, RegisterDescriptor};

/// Capacities the controller family ships with
pub const SUPPORTED_CAPACITIES: [u8; 6] = [4, 5, 7, 9, 14, 16];

/// Nominal power per load in watts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerTable {
    pub compressor: u32,
    pub aux_stage_1: u32,
    pub aux_stage_2: u32,
    pub pump_p1: u32,
    pub pump_p2: u32,
    pub pump_p3: u32,
}

impl PowerTable {
    /// Ratings of the mid-size (5 kW) pump
    const BASE: PowerTable = PowerTable {
        compressor: 1500,
        aux_stage_1: 3000,
        aux_stage_2: 6000,
        pump_p1: 55,
        pump_p2: 46,
        pump_p3: 106,
    };

    pub fn watts(&self, load: Load) -> u32 {
        match load {
            Load::Compressor => self.compressor,
            Load::AuxStage1 => self.aux_stage_1,
            Load::AuxStage2 => self.aux_stage_2,
            Load::PumpP1 => self.pump_p1,
            Load::PumpP2 => self.pump_p2,
            Load::PumpP3 => self.pump_p3,
        }
    }

    fn for_capacity(capacity_kw: u8) -> PowerTable {
        let base = Self::BASE;
        match capacity_kw {
            4 => PowerTable {
                compressor: 1100,
                pump_p1: 0,
                pump_p2: 35,
                pump_p3: 70,
                ..base
            },
            7 => PowerTable {
                compressor: 1850,
                ..base
            },
            9 => PowerTable {
                compressor: 2500,
                ..base
            },
            14 => PowerTable {
                compressor: 4100,
                aux_stage_1: 5250,
                aux_stage_2: 10500,
                ..base
            },
            16 => PowerTable {
                compressor: 4600,
                aux_stage_1: 5250,
                aux_stage_2: 10500,
                pump_p1: 90,
                pump_p2: 165,
                ..base
            },
            _ => base,
        }
    }
}

/// Resolved, immutable pump profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PumpProfile {
    pub capacity_kw: u8,
    /// Labeled capacities of the two auxiliary heating stages
    pub aux_stages_kw: [u8; 2],
    pub power: PowerTable,
}

impl PumpProfile {
    fn aux_family(&self) -> AppliesTo {
        if self.aux_stages_kw == [5, 10] {
            AppliesTo::LargeAux
        } else {
            AppliesTo::SmallAux
        }
    }

    pub fn applies(&self, descriptor: &RegisterDescriptor) -> bool {
        descriptor.applies_to == AppliesTo::All || descriptor.applies_to == self.aux_family()
    }
}

/// Map a configured capacity to its profile
pub fn resolve_profile(capacity_kw: u8) -> RegoResult<PumpProfile> {
    if !SUPPORTED_CAPACITIES.contains(&capacity_kw) {
        return Err(config_error!(
            "pump.capacity_kw {} not supported (expected one of {:?})",
            capacity_kw,
            SUPPORTED_CAPACITIES
        ));
    }

    let aux_stages_kw = if capacity_kw <= 9 { [3, 6] } else { [5, 10] };

    Ok(PumpProfile {
        capacity_kw,
        aux_stages_kw,
        power: PowerTable::for_capacity(capacity_kw),
    })
}

/// Catalog entries applicable to the profile
pub fn active_registers(profile: &PumpProfile) -> Vec<&'static RegisterDescriptor> {
    catalog().iter().filter(|d| profile.applies(d)).collect()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::registers::catalog::Bank;

    #[test]
    fn test_aux_labels() {
        assert_eq!(resolve_profile(5).unwrap().aux_stages_kw, [3, 6]);
        assert_eq!(resolve_profile(16).unwrap().aux_stages_kw, [5, 10]);
    }

    #[test]
    fn test_power_tables() {
        let small = resolve_profile(4).unwrap().power;
        assert_eq!(small.compressor, 1100);
        assert_eq!(small.pump_p1, 0);
        assert_eq!(small.aux_stage_1, 3000);

        let large = resolve_profile(16).unwrap().power;
        assert_eq!(large.compressor, 4600);
        assert_eq!(large.aux_stage_2, 10500);
        assert_eq!(large.pump_p2, 165);
        assert_eq!(large.pump_p3, 106);
    }

    #[test]
    fn test_active_registers_swap_aux_labels_only() {
        let small = active_registers(&resolve_profile(9).unwrap());
        let large = active_registers(&resolve_profile(14).unwrap());
        assert_eq!(small.len(), large.len());

        let aux_small: Vec<_> = small
            .iter()
            .filter(|d| d.id == 0x01FF && d.bank == Bank::System)
            .collect();
        let aux_large: Vec<_> = large
            .iter()
            .filter(|d| d.id == 0x01FF && d.bank == Bank::System)
            .collect();
        assert_eq!(aux_small.len(), 1);
        assert_eq!(aux_large.len(), 1);
        assert_eq!(aux_small[0].name, "Add heat 3kw");
        assert_eq!(aux_large[0].name, "Add heat 5kw");
    }
}
