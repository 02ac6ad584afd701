use crate::alexa::capabilities::{
    is_unavailable, supported_features, Capability, CapabilityError, PropertyResult,
    STATE_UNKNOWN,
};
use crate::alexa::consts::features::{climate, water_heater};
use crate::alexa::consts::{lookup, TempUnit, THERMOSTAT_MODES, THERMOSTAT_PRESETS};
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

pub struct ThermostatController {
    entity: Arc<Entity>,
    unit: TempUnit,
}

impl ThermostatController {
    pub fn new(entity: Arc<Entity>, unit: TempUnit) -> Self {
        Self { entity, unit }
    }

    fn is_water_heater(&self) -> bool {
        self.entity.domain() == "water_heater"
    }
}

impl Capability for ThermostatController {
    fn name(&self) -> &'static str {
        "Alexa.ThermostatController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        let supported = supported_features(&self.entity).unwrap_or(0);

        if self.is_water_heater() {
            return if supported & water_heater::TARGET_TEMPERATURE != 0 {
                &["thermostatMode", "targetSetpoint"]
            } else {
                &["thermostatMode"]
            };
        }

        let range = supported & climate::TARGET_TEMPERATURE_RANGE != 0;
        let target = supported & climate::TARGET_TEMPERATURE != 0;
        match (range, target) {
            (true, true) => &["thermostatMode", "lowerSetpoint", "upperSetpoint", "targetSetpoint"],
            (true, false) => &["thermostatMode", "lowerSetpoint", "upperSetpoint"],
            (false, true) => &["thermostatMode", "targetSetpoint"],
            (false, false) => &["thermostatMode"],
        }
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if is_unavailable(&self.entity) {
            return Ok(None);
        }

        let attribute = match name {
            "thermostatMode" => return self.thermostat_mode(),
            "targetSetpoint" => "temperature",
            "lowerSetpoint" => "target_temp_low",
            "upperSetpoint" => "target_temp_high",
            _ => return Err(CapabilityError::unsupported(self.name(), name)),
        };

        if self.entity.attr(attribute).is_none() {
            return Ok(None);
        }
        match self.entity.attr_f64(attribute) {
            Some(temp) => Ok(Some(json!({"value": temp, "scale": self.unit.api_name()}))),
            None => {
                warn!(
                    entity_id = %self.entity.entity_id,
                    property = name,
                    "Invalid temperature value"
                );
                Ok(None)
            }
        }
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        if self.is_water_heater() {
            return Ok(None);
        }

        let mut supported_modes: Vec<&str> = self
            .entity
            .attr_list("hvac_modes")
            .iter()
            .filter_map(|mode| lookup(THERMOSTAT_MODES, mode))
            .collect();
        supported_modes.extend(
            self.entity
                .attr_list("preset_modes")
                .iter()
                .filter_map(|preset| lookup(THERMOSTAT_PRESETS, preset)),
        );

        let mut configuration = json!({ "supportsScheduling": false });
        if !supported_modes.is_empty() {
            configuration["supportedModes"] = json!(supported_modes);
        }
        Ok(Some(configuration))
    }
}

impl ThermostatController {
    fn thermostat_mode(&self) -> PropertyResult {
        if self.is_water_heater() {
            return Ok(None);
        }

        if let Some(mode) = self
            .entity
            .attr_str("preset_mode")
            .and_then(|preset| lookup(THERMOSTAT_PRESETS, preset))
        {
            return Ok(Some(json!(mode)));
        }

        if self.entity.state == STATE_UNKNOWN {
            return Ok(None);
        }

        match lookup(THERMOSTAT_MODES, &self.entity.state) {
            Some(mode) => Ok(Some(json!(mode))),
            None => {
                error!(
                    entity_id = %self.entity.entity_id,
                    state = %self.entity.state,
                    "Unsupported thermostat state"
                );
                Err(CapabilityError::invalid(&self.entity, "state"))
            }
        }
    }
}

pub struct TemperatureSensor {
    entity: Arc<Entity>,
    unit: TempUnit,
}

impl TemperatureSensor {
    pub fn new(entity: Arc<Entity>, unit: TempUnit) -> Self {
        Self { entity, unit }
    }
}

impl Capability for TemperatureSensor {
    fn name(&self) -> &'static str {
        "Alexa.TemperatureSensor"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["temperature"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "temperature" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        // Thermostats report the reading as an attribute in the system unit
        let (temp, unit) = match self.entity.domain() {
            "climate" | "water_heater" => (self.entity.attr("current_temperature").cloned(), self.unit),
            _ => {
                let unit = self
                    .entity
                    .attr_str("unit_of_measurement")
                    .and_then(TempUnit::from_unit)
                    .unwrap_or(self.unit);
                (Some(json!(self.entity.state)), unit)
            }
        };

        let value = match temp {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if s != "unavailable" && s != STATE_UNKNOWN => {
                match s.trim().parse::<f64>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!(entity_id = %self.entity.entity_id, value = %s, "Invalid temperature value");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(value.map(|v| json!({"value": v, "scale": unit.api_name()})))
    }
}
