//! Inverter sensor table: which flattened key feeds which reading, with
//! label, unit and value transform.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GridMode {
    Disconnected,
    Consuming,
    Feeding,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryMode {
    Disconnected,
    Charging,
    Discharging,
    Unknown,
}

impl fmt::Display for GridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GridMode::Disconnected => "disconnected",
            GridMode::Consuming => "consuming",
            GridMode::Feeding => "feeding",
            GridMode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatteryMode::Disconnected => "disconnected",
            BatteryMode::Charging => "charging",
            BatteryMode::Discharging => "discharging",
            BatteryMode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Integral mode code; `1.0` counts as `1`.
fn mode_code(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
}

pub fn grid_mode(value: &Value) -> GridMode {
    match mode_code(value) {
        Some(0) => GridMode::Disconnected,
        Some(1) => GridMode::Consuming,
        Some(2) => GridMode::Feeding,
        _ => GridMode::Unknown,
    }
}

pub fn battery_mode(value: &Value) -> BatteryMode {
    match mode_code(value) {
        Some(0) => BatteryMode::Disconnected,
        Some(1) => BatteryMode::Charging,
        Some(2) => BatteryMode::Discharging,
        _ => BatteryMode::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Voltage,
    Power,
    Energy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Identity,
    /// Device reports tenths.
    Tenths,
    GridMode,
    BatteryMode,
}

impl Transform {
    pub fn apply(self, raw: &Value) -> Value {
        match self {
            Transform::Identity => raw.clone(),
            Transform::Tenths => match raw.as_f64() {
                Some(v) => json!(v / 10.0),
                None => Value::Null,
            },
            Transform::GridMode => json!(grid_mode(raw).to_string()),
            Transform::BatteryMode => json!(battery_mode(raw).to_string()),
        }
    }
}

#[derive(Debug)]
pub struct SensorDescriptor {
    /// Entity key, suffix of the unique id.
    pub key: &'static str,
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub icon: Option<&'static str>,
    /// Flattened telemetry key this sensor listens to.
    pub message_key: &'static str,
    pub transform: Transform,
}

pub const VOLT: &str = "V";
pub const WATT: &str = "W";
pub const HERTZ: &str = "Hz";
pub const PERCENT: &str = "%";
pub const KILO_WATT_HOUR: &str = "kWh";

const fn sensor(key: &'static str, name: &'static str, message_key: &'static str) -> SensorDescriptor {
    SensorDescriptor {
        key,
        name,
        unit: None,
        device_class: None,
        icon: None,
        message_key,
        transform: Transform::Identity,
    }
}

const fn measured(
    key: &'static str,
    name: &'static str,
    unit: &'static str,
    class: DeviceClass,
    message_key: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        unit: Some(unit),
        device_class: Some(class),
        ..sensor(key, name, message_key)
    }
}

const fn with_icon(
    key: &'static str,
    name: &'static str,
    unit: &'static str,
    icon: &'static str,
    message_key: &'static str,
) -> SensorDescriptor {
    SensorDescriptor {
        unit: Some(unit),
        icon: Some(icon),
        ..sensor(key, name, message_key)
    }
}

pub static INVERTER_SENSORS: [SensorDescriptor; 18] = [
    measured("grid_voltage", "Grid voltage", VOLT, DeviceClass::Voltage, "grid.v"),
    measured("grid_watts", "Grid consumption/production", WATT, DeviceClass::Power, "grid.w"),
    with_icon("grid_frequency", "Grid frequency", HERTZ, "mdi:current-ac", "grid.f"),
    with_icon("grid_percentage", "Grid percentage", PERCENT, "mdi:gauge", "grid.pt"),
    SensorDescriptor {
        transform: Transform::GridMode,
        ..sensor("grid_mode", "Grid mode", "grid.d")
    },
    measured("load_voltage", "Load voltage", VOLT, DeviceClass::Voltage, "load.v"),
    measured("load_watts", "Load", WATT, DeviceClass::Power, "load.w"),
    with_icon("load_frequency", "Load frequency", HERTZ, "mdi:information-outline", "load.f"),
    with_icon("load_percentage", "Load percentage", PERCENT, "mdi:gauge", "load.pt"),
    SensorDescriptor {
        transform: Transform::Tenths,
        ..measured("battery_voltage", "Battery voltage", VOLT, DeviceClass::Voltage, "battery.v")
    },
    with_icon("battery_percentage", "Battery percentage", PERCENT, "mdi:gauge", "battery.pt"),
    SensorDescriptor {
        transform: Transform::BatteryMode,
        ..sensor("battery_mode", "Battery mode", "battery.d")
    },
    measured("solar_voltage", "Solar voltage", VOLT, DeviceClass::Voltage, "pv.v"),
    measured("solar_watts", "Solar production", WATT, DeviceClass::Power, "pv.w"),
    measured("solar_energy_total", "Energy total", KILO_WATT_HOUR, DeviceClass::Energy, "oth.et"),
    measured("solar_energy_year", "Energy this year", KILO_WATT_HOUR, DeviceClass::Energy, "oth.ey"),
    measured("solar_energy_month", "Energy this month", KILO_WATT_HOUR, DeviceClass::Energy, "oth.em"),
    measured("solar_energy_today", "Energy today", KILO_WATT_HOUR, DeviceClass::Energy, "oth.ed"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn find_by_message_key(message_key: &str) -> Option<&'static SensorDescriptor> {
        INVERTER_SENSORS.iter().find(|s| s.message_key == message_key)
    }

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<_> = INVERTER_SENSORS.iter().map(|s| s.key).collect();
        let message_keys: HashSet<_> = INVERTER_SENSORS.iter().map(|s| s.message_key).collect();
        assert_eq!(keys.len(), INVERTER_SENSORS.len());
        assert_eq!(message_keys.len(), INVERTER_SENSORS.len());
    }

    #[test]
    fn test_mode_transforms() {
        assert_eq!(grid_mode(&json!(0)), GridMode::Disconnected);
        assert_eq!(grid_mode(&json!(2)), GridMode::Feeding);
        assert_eq!(grid_mode(&json!(1.0)), GridMode::Consuming);
        assert_eq!(grid_mode(&json!(7)), GridMode::Unknown);
        assert_eq!(grid_mode(&json!("1")), GridMode::Unknown);
        assert_eq!(battery_mode(&json!(1)), BatteryMode::Charging);
        assert_eq!(battery_mode(&json!(2)), BatteryMode::Discharging);
        assert_eq!(battery_mode(&Value::Null), BatteryMode::Unknown);
    }

    #[test]
    fn test_battery_voltage_is_tenths() {
        let battery = find_by_message_key("battery.v").unwrap();
        assert_eq!(battery.transform.apply(&json!(524)), json!(52.4));
        assert_eq!(battery.unit, Some(VOLT));
    }

    #[test]
    fn test_lookup() {
        let energy = find_by_message_key("oth.ed").unwrap();
        assert_eq!(energy.key, "solar_energy_today");
        assert_eq!(energy.device_class, Some(DeviceClass::Energy));
        assert_eq!(find_by_message_key("grid.d").unwrap().transform.apply(&json!(2)), json!("feeding"));
        assert!(find_by_message_key("nope").is_none());
    }
}
