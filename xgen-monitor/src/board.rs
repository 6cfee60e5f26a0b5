//! Per-inverter reading state, fed by the session observer.

use crate::sensors::{DeviceClass, SensorDescriptor, INVERTER_SENSORS};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use xgen_client::{ObserverError, Telemetry, TelemetryObserver};

/// One reading as shown to users.
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub unique_id: String,
    pub name: String,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub icon: Option<&'static str>,
    pub value: Option<Value>,
}

struct SensorState {
    unique_id: String,
    name: String,
    descriptor: &'static SensorDescriptor,
    raw: Option<Value>,
}

impl SensorState {
    fn native_value(&self) -> Option<Value> {
        self.raw.as_ref().map(|raw| self.descriptor.transform.apply(raw))
    }
}

pub struct SensorBoard {
    observer_name: String,
    /// Keyed by flattened message key.
    sensors: parking_lot::Mutex<HashMap<&'static str, SensorState>>,
}

impl SensorBoard {
    pub fn new(inverter_name: &str, inverter_id: Option<&str>) -> Self {
        let inverter_id = inverter_id
            .map(str::to_string)
            .unwrap_or_else(|| underscore(inverter_name));

        let sensors = INVERTER_SENSORS
            .iter()
            .map(|descriptor| {
                let state = SensorState {
                    unique_id: format!("{inverter_id}_{}", descriptor.key),
                    name: format!("{inverter_name} {}", descriptor.name),
                    descriptor,
                    raw: None,
                };
                (descriptor.message_key, state)
            })
            .collect();

        Self {
            observer_name: format!("sensor-board:{inverter_id}"),
            sensors: parking_lot::Mutex::new(sensors),
        }
    }

    /// Stores each known value that differs from the previous one.
    /// Returns how many readings changed.
    pub fn apply(&self, telemetry: &Telemetry) -> usize {
        let mut sensors = self.sensors.lock();
        let mut changed = 0;
        for (key, value) in telemetry {
            let Some(sensor) = sensors.get_mut(key.as_str()) else {
                continue;
            };
            if sensor.raw.as_ref() == Some(value) {
                continue;
            }
            sensor.raw = Some(value.clone());
            changed += 1;
            let shown = sensor.native_value().unwrap_or(Value::Null);
            debug!("Updating sensor {} with value {}", sensor.unique_id, shown);
        }
        changed
    }

    pub fn reading(&self, message_key: &str) -> Option<Reading> {
        self.sensors.lock().get(message_key).map(to_reading)
    }

    /// All readings, in table order.
    pub fn readings(&self) -> Vec<Reading> {
        let sensors = self.sensors.lock();
        INVERTER_SENSORS
            .iter()
            .filter_map(|d| sensors.get(d.message_key))
            .map(to_reading)
            .collect()
    }
}

fn to_reading(state: &SensorState) -> Reading {
    Reading {
        unique_id: state.unique_id.clone(),
        name: state.name.clone(),
        unit: state.descriptor.unit,
        device_class: state.descriptor.device_class,
        icon: state.descriptor.icon,
        value: state.native_value(),
    }
}

impl TelemetryObserver for SensorBoard {
    fn name(&self) -> &str {
        &self.observer_name
    }

    fn on_telemetry(&self, telemetry: Telemetry) -> Result<(), ObserverError> {
        self.apply(&telemetry);
        Ok(())
    }
}

/// `"TeslaPV Roof-Top"` → `"tesla_pv roof_top"`: CamelCase split, dashes to
/// underscores, lowercased. Spaces are kept.
pub fn underscore(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(word.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        if c == '-' {
            out.push('_');
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}
