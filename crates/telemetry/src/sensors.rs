//! Default temperature producer backed by sysinfo's hwmon view.

use std::collections::BTreeMap;
use std::sync::Mutex;

use sysinfo::Components;

use crate::producers::{ProducerError, SensorProvider};

/// Reads temperatures from the platform sensor tree on demand.
pub struct SysinfoSensors {
    components: Mutex<Components>,
}

impl SysinfoSensors {
    pub fn new() -> Self {
        Self {
            components: Mutex::new(Components::new_with_refreshed_list()),
        }
    }
}

impl Default for SysinfoSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorProvider for SysinfoSensors {
    fn current(&self) -> Result<BTreeMap<String, f64>, ProducerError> {
        let mut components = self
            .components
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        components.refresh(true);

        let mut temps = BTreeMap::new();
        for component in components.iter() {
            if let Some(temp) = component.temperature() {
                if temp.is_finite() && temp > 0.0 {
                    temps.insert(component.label().to_string(), f64::from(temp));
                }
            }
        }
        Ok(temps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_never_reports_bogus_temperatures() {
        let sensors = SysinfoSensors::new();
        let temps = sensors.current().unwrap();
        for (label, temp) in temps {
            assert!(temp > 0.0, "sensor {label} reported {temp}");
            assert!(temp < 200.0, "sensor {label} reported {temp}");
        }
    }
}
