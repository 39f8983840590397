//! Static register catalog of the Rego 600/635 controller

use serde::Serialize;
use std::fmt;

/// Engineering unit of a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Celsius,
    Watt,
    KilowattHour,
    Bool,
    Percent,
    Raw,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Watt => "W",
            Unit::KilowattHour => "kWh",
            Unit::Bool => "",
            Unit::Percent => "%",
            Unit::Raw => "",
        }
    }
}

/// Rational scale applied to the raw register value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scale {
    pub num: i32,
    pub den: i32,
}

impl Scale {
    pub const UNIT: Scale = Scale { num: 1, den: 1 };
    pub const TENTHS: Scale = Scale { num: 1, den: 10 };

    pub fn decode(&self, raw: i32) -> f64 {
        f64::from(raw) * f64::from(self.num) / f64::from(self.den)
    }

    /// Inverse of [`Scale::decode`], rounded to the nearest raw step
    pub fn encode(&self, value: f64) -> f64 {
        (value * f64::from(self.den) / f64::from(self.num)).round()
    }

    pub fn is_unit(&self) -> bool {
        self.num == self.den
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Temperature,
    Binary,
    Measurement,
    PowerDerived,
    DisplayRow,
    Setting,
}

/// Address space a register lives in; selects the read/write command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Bank {
    System,
    FrontPanel,
    Display,
    /// Computed by the gateway, never read from the controller
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rate {
    EveryCycle,
    Slow,
}

/// Which pump profiles a descriptor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppliesTo {
    All,
    /// Pumps with 3 + 6 kW auxiliary stages
    SmallAux,
    /// Pumps with 5 + 10 kW auxiliary stages
    LargeAux,
}

/// Electrical loads of the power model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Load {
    Compressor,
    AuxStage1,
    AuxStage2,
    PumpP1,
    PumpP2,
    PumpP3,
}

impl Load {
    pub const ALL: [Load; 6] = [
        Load::Compressor,
        Load::AuxStage1,
        Load::AuxStage2,
        Load::PumpP1,
        Load::PumpP2,
        Load::PumpP3,
    ];

    /// Binary register that tells whether the load runs
    pub fn register_id(&self) -> u16 {
        match self {
            Load::Compressor => 0x01FE,
            Load::AuxStage1 => 0x01FF,
            Load::AuxStage2 => 0x0200,
            Load::PumpP1 => 0x0203,
            Load::PumpP2 => 0x0204,
            Load::PumpP3 => 0x01FD,
        }
    }

    /// Topic slug under `power/`, kept stable across pump sizes
    pub fn key(&self) -> &'static str {
        match self {
            Load::Compressor => "compressor",
            Load::AuxStage1 => "add_heat_3kw",
            Load::AuxStage2 => "add_heat_6kw",
            Load::PumpP1 => "pump_p1",
            Load::PumpP2 => "pump_p2",
            Load::PumpP3 => "pump_p3",
        }
    }
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One register of the controller (or one gateway-derived value)
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct RegisterDescriptor {
    pub id: u16,
    pub name: &'static str,
    /// Topic slug
    pub key: &'static str,
    pub unit: Unit,
    pub scale: Scale,
    pub category: Category,
    pub bank: Bank,
    pub rate: Rate,
    pub applies_to: AppliesTo,
    pub load: Option<Load>,
    /// Accepted raw range for writes
    pub limits: Option<(i16, i16)>,
}

impl RegisterDescriptor {
    /// Registers the poll loop reads from the controller
    pub fn is_polled(&self) -> bool {
        matches!(self.bank, Bank::System | Bank::FrontPanel)
    }

    pub fn is_writable(&self) -> bool {
        self.category == Category::Setting
    }

    pub fn accepts(&self, raw: i16) -> bool {
        self.limits.is_some_and(|(min, max)| (min..=max).contains(&raw))
    }
}

impl fmt::Display for RegisterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06X})", self.name, self.id)
    }
}

const fn temperature(id: u16, name: &'static str, key: &'static str) -> RegisterDescriptor {
    RegisterDescriptor {
        id,
        name,
        key,
        unit: Unit::Celsius,
        scale: Scale::TENTHS,
        category: Category::Temperature,
        bank: Bank::System,
        rate: Rate::EveryCycle,
        applies_to: AppliesTo::All,
        load: None,
        limits: None,
    }
}

const fn binary(
    id: u16,
    name: &'static str,
    key: &'static str,
    applies_to: AppliesTo,
    load: Option<Load>,
) -> RegisterDescriptor {
    RegisterDescriptor {
        id,
        name,
        key,
        unit: Unit::Bool,
        scale: Scale::UNIT,
        category: Category::Binary,
        bank: Bank::System,
        rate: Rate::EveryCycle,
        applies_to,
        load,
        limits: None,
    }
}

const fn led(id: u16, name: &'static str, key: &'static str) -> RegisterDescriptor {
    RegisterDescriptor {
        id,
        name,
        key,
        unit: Unit::Bool,
        scale: Scale::UNIT,
        category: Category::Binary,
        bank: Bank::FrontPanel,
        rate: Rate::EveryCycle,
        applies_to: AppliesTo::All,
        load: None,
        limits: None,
    }
}

/// Setting in tenths; `min`/`max` in engineering units
const fn setting(
    id: u16,
    name: &'static str,
    key: &'static str,
    min: i16,
    max: i16,
) -> RegisterDescriptor {
    RegisterDescriptor {
        id,
        name,
        key,
        unit: Unit::Celsius,
        scale: Scale::TENTHS,
        category: Category::Setting,
        bank: Bank::System,
        rate: Rate::Slow,
        applies_to: AppliesTo::All,
        load: None,
        limits: Some((min * 10, max * 10)),
    }
}

const fn display_row(row: u16, name: &'static str, key: &'static str) -> RegisterDescriptor {
    RegisterDescriptor {
        id: row,
        name,
        key,
        unit: Unit::Raw,
        scale: Scale::UNIT,
        category: Category::DisplayRow,
        bank: Bank::Display,
        rate: Rate::EveryCycle,
        applies_to: AppliesTo::All,
        load: None,
        limits: None,
    }
}

const fn derived(
    id: u16,
    name: &'static str,
    key: &'static str,
    unit: Unit,
    load: Option<Load>,
) -> RegisterDescriptor {
    RegisterDescriptor {
        id,
        name,
        key,
        unit,
        scale: Scale::UNIT,
        category: Category::PowerDerived,
        bank: Bank::Derived,
        rate: Rate::EveryCycle,
        applies_to: AppliesTo::All,
        load,
        limits: None,
    }
}

/// Id of the derived total-power entry
pub const POWER_TOTAL_ID: u16 = 0xF100;
/// Id of the derived energy entry
pub const ENERGY_TOTAL_ID: u16 = 0xF101;

/// Front panel key registers 1..=3
pub const KEY_REGISTERS: [u16; 3] = [0x0009, 0x000A, 0x000B];
/// Front panel wheel register
pub const WHEEL_REGISTER: u16 = 0x0044;

static CATALOG: [RegisterDescriptor; 59] = [
    // Temperatures
    temperature(0x0209, "Radiator Return GT1", "Radiator_Return_GT1"),
    temperature(0x006E, "Radiator Target GT1", "Radiator_Target_GT1"),
    temperature(0x020A, "Outdoor GT2", "Outdoor_GT2"),
    temperature(0x020B, "Hot Water GT3", "Hot_Water_GT3"),
    temperature(0x002B, "Hot Water Target GT3", "Hot_Water_Target_GT3"),
    temperature(0x006D, "Forward Target GT4", "Forward_Target_GT4"),
    temperature(0x020D, "Room GT5", "Room_GT5"),
    temperature(0x020E, "Compressor GT6", "Compressor_GT6"),
    temperature(0x020F, "Heat fluid out GT8", "Heat_fluid_out_GT8"),
    temperature(0x0210, "Heat fluid in GT9", "Heat_fluid_in_GT9"),
    temperature(0x0211, "Cold fluid in GT10", "Cold_fluid_in_GT10"),
    temperature(0x0212, "Cold fluid out GT11", "Cold_fluid_out_GT11"),
    temperature(0x0073, "GT3 On", "GT3_On"),
    temperature(0x0074, "GT3 Off", "GT3_Off"),
    // Binary states
    binary(0x0205, "Three-way Valve", "Three-way_Valve", AppliesTo::All, None),
    binary(
        0x0203,
        "Radiator Pump P1",
        "Radiator_Pump_P1",
        AppliesTo::All,
        Some(Load::PumpP1),
    ),
    binary(
        0x0204,
        "Heat carrier pump P2",
        "Heat_carrier_pump_P2",
        AppliesTo::All,
        Some(Load::PumpP2),
    ),
    binary(
        0x01FD,
        "Ground loop pump P3",
        "Ground_loop_pump_P3",
        AppliesTo::All,
        Some(Load::PumpP3),
    ),
    binary(
        0x01FE,
        "Compressor",
        "Compressor",
        AppliesTo::All,
        Some(Load::Compressor),
    ),
    binary(0x0206, "Alarm", "Alarm", AppliesTo::All, None),
    binary(
        0x01FF,
        "Add heat 3kw",
        "Add_heat_3kw",
        AppliesTo::SmallAux,
        Some(Load::AuxStage1),
    ),
    binary(
        0x0200,
        "Add heat 6kw",
        "Add_heat_6kw",
        AppliesTo::SmallAux,
        Some(Load::AuxStage2),
    ),
    binary(
        0x01FF,
        "Add heat 5kw",
        "Add_heat_5kw",
        AppliesTo::LargeAux,
        Some(Load::AuxStage1),
    ),
    binary(
        0x0200,
        "Add heat 10kw",
        "Add_heat_10kw",
        AppliesTo::LargeAux,
        Some(Load::AuxStage2),
    ),
    RegisterDescriptor {
        id: 0x006C,
        name: "Add Heat Percentage",
        key: "Add_Heat_Percentage",
        unit: Unit::Percent,
        scale: Scale::TENTHS,
        category: Category::Measurement,
        bank: Bank::System,
        rate: Rate::EveryCycle,
        applies_to: AppliesTo::All,
        load: None,
        limits: None,
    },
    // Front panel LEDs
    led(0x0012, "LED1 Power On", "LED1_Power_On"),
    led(0x0013, "LED2 Pump", "LED2_Pump"),
    led(0x0014, "LED3 Add Heat", "LED3_Add_Heat"),
    led(0x0015, "LED4 Boiler", "LED4_Boiler"),
    led(0x0016, "LED5 Alarm", "LED5_Alarm"),
    // Settings
    setting(0x0000, "Heat curve", "heat_curve", 0, 10),
    setting(0x0001, "Heat curve fine adj.", "heat_curve_fine_adj", -10, 10),
    setting(0x0021, "Indoor temp setting", "indoor_temp_setting", 10, 30),
    setting(0x0022, "Curve infl. by in-temp.", "curve_infl_by_in_temp", -10, 10),
    setting(0x0002, "Heat curve coupling diff.", "heat_curve_coupling_diff", 0, 15),
    setting(0x001E, "Adjust curve at +20° out", "adjust_curve_at_20_out", -10, 10),
    setting(0x001C, "Adjust curve at +15° out", "adjust_curve_at_15_out", -10, 10),
    setting(0x001A, "Adjust curve at +10° out", "adjust_curve_at_10_out", -10, 10),
    setting(0x0018, "Adjust curve at +5° out", "adjust_curve_at_5_out", -10, 10),
    setting(0x0016, "Adjust curve at 0° out", "adjust_curve_at_0_out", -10, 10),
    setting(0x0014, "Adjust curve at -5° out", "adjust_curve_at_-5_out", -10, 10),
    setting(0x0012, "Adjust curve at -10° out", "adjust_curve_at_-10_out", -10, 10),
    setting(0x0010, "Adjust curve at -15° out", "adjust_curve_at_-15_out", -10, 10),
    setting(0x000E, "Adjust curve at -20° out", "adjust_curve_at_-20_out", -10, 10),
    setting(0x000C, "Adjust curve at -25° out", "adjust_curve_at_-25_out", -10, 10),
    setting(0x000A, "Adjust curve at -30° out", "adjust_curve_at_-30_out", -10, 10),
    setting(0x0008, "Adjust curve at -35° out", "adjust_curve_at_-35_out", -10, 10),
    // Display
    display_row(0, "Display row 1", "Row_1"),
    display_row(1, "Display row 2", "Row_2"),
    display_row(2, "Display row 3", "Row_3"),
    display_row(3, "Display row 4", "Row_4"),
    // Derived
    derived(
        0xF000,
        "Compressor power",
        "compressor",
        Unit::Watt,
        Some(Load::Compressor),
    ),
    derived(
        0xF001,
        "Aux stage 1 power",
        "add_heat_3kw",
        Unit::Watt,
        Some(Load::AuxStage1),
    ),
    derived(
        0xF002,
        "Aux stage 2 power",
        "add_heat_6kw",
        Unit::Watt,
        Some(Load::AuxStage2),
    ),
    derived(
        0xF003,
        "Radiator pump P1 power",
        "pump_p1",
        Unit::Watt,
        Some(Load::PumpP1),
    ),
    derived(
        0xF004,
        "Heat carrier pump P2 power",
        "pump_p2",
        Unit::Watt,
        Some(Load::PumpP2),
    ),
    derived(
        0xF005,
        "Ground loop pump P3 power",
        "pump_p3",
        Unit::Watt,
        Some(Load::PumpP3),
    ),
    derived(POWER_TOTAL_ID, "Total power", "total", Unit::Watt, None),
    derived(
        ENERGY_TOTAL_ID,
        "Total energy",
        "total",
        Unit::KilowattHour,
        None,
    ),
];

/// The whole catalog
pub fn catalog() -> &'static [RegisterDescriptor] {
    &CATALOG
}

/// Look up a descriptor by bank and id
///
/// Aux-stage ids exist once per profile family; the first match is returned.
pub fn find(bank: Bank, id: u16) -> Option<&'static RegisterDescriptor> {
    CATALOG.iter().find(|d| d.bank == bank && d.id == id)
}

/// Look up a writable setting by its topic key
pub fn find_setting(key: &str) -> Option<&'static RegisterDescriptor> {
    CATALOG
        .iter()
        .find(|d| d.category == Category::Setting && d.key == key)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_unique_per_profile_family() {
        for family in [AppliesTo::SmallAux, AppliesTo::LargeAux] {
            let mut seen = HashSet::new();
            for d in catalog()
                .iter()
                .filter(|d| d.applies_to == AppliesTo::All || d.applies_to == family)
            {
                let scope = (d.category, d.bank, d.unit.symbol(), d.key);
                assert!(seen.insert(scope), "duplicate key {}", d.key);
            }
        }
    }

    #[test]
    fn test_setting_lookup() {
        let heat_curve = find_setting("heat_curve").unwrap();
        assert_eq!(heat_curve.id, 0x0000);
        assert!(heat_curve.is_writable());
        assert_eq!(heat_curve.rate, Rate::Slow);

        assert_eq!(find_setting("adjust_curve_at_-35_out").unwrap().id, 0x0008);
        assert!(find_setting("Outdoor_GT2").is_none());
    }

    #[test]
    fn test_only_settings_have_write_limits() {
        for d in catalog() {
            assert_eq!(d.limits.is_some(), d.is_writable(), "{}", d.key);
        }
        let indoor = find_setting("indoor_temp_setting").unwrap();
        assert_eq!(indoor.limits, Some((100, 300)));
        assert!(indoor.accepts(215));
        assert!(!indoor.accepts(301));
        assert!(!find(Bank::System, 0x020A).unwrap().accepts(0));
    }

    #[test]
    fn test_led_and_setting_share_ids_in_different_banks() {
        let led = find(Bank::FrontPanel, 0x0012).unwrap();
        let setting = find(Bank::System, 0x0012).unwrap();
        assert_eq!(led.name, "LED1 Power On");
        assert_eq!(setting.key, "adjust_curve_at_-10_out");
    }

    #[test]
    fn test_every_load_has_one_register_per_family() {
        for load in Load::ALL {
            let polled: Vec<_> = catalog()
                .iter()
                .filter(|d| d.is_polled() && d.load == Some(load))
                .collect();
            assert!(!polled.is_empty());
            assert!(polled.iter().all(|d| d.id == load.register_id()));
        }
    }

    #[test]
    fn test_scale() {
        assert_eq!(Scale::TENTHS.decode(215), 21.5);
        assert_eq!(Scale::TENTHS.decode(-35), -3.5);
        assert_eq!(Scale::TENTHS.encode(21.5), 215.0);
        assert!(Scale::UNIT.is_unit());
    }
}
