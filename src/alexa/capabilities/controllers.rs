//! Generic controllers addressed by instance ("<domain>.<attribute>").

use crate::alexa::capabilities::{
    has_feature, Capability, CapabilityError, PropertyResult, STATE_UNAVAILABLE, STATE_UNKNOWN,
};
use crate::alexa::consts::features::{cover, valve};
use crate::alexa::consts::{lookup, FAN_SPEED_PERCENTAGES, PRESET_MODE_NA};
use crate::alexa::resources::{
    catalog, number, serialize_labels, ModeResource, PresetResource, Semantics,
};
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;

/// Three-speed fan abstraction: percentage -> speed tier
pub fn fan_speed_tier(percentage: i64) -> &'static str {
    match percentage {
        p if p < 0 => "off",
        p if p <= 33 => "low",
        p if p <= 66 => "medium",
        p if p <= 100 => "high",
        _ => "off",
    }
}

/// Current fan percentage: explicit attribute, else derived from the speed tier
pub fn fan_percentage(entity: &Entity) -> i64 {
    if let Some(percentage) = entity.attr_f64("percentage") {
        return percentage as i64;
    }
    entity
        .attr_str("speed")
        .and_then(|speed| lookup(FAN_SPEED_PERCENTAGES, speed))
        .unwrap_or(0)
}

fn catalog_unit(entity: &Entity) -> Option<&'static str> {
    match entity.attr_str("unit_of_measurement")? {
        "%" => Some(catalog::UNIT_PERCENT),
        "°C" => Some(catalog::UNIT_TEMPERATURE_CELSIUS),
        "°F" => Some(catalog::UNIT_TEMPERATURE_FAHRENHEIT),
        _ => None,
    }
}

/// Target humidity bounds, defaulting to 10..=90 %
fn humidity_bounds(entity: &Entity) -> (f64, f64) {
    (
        entity.attr_f64("min_humidity").unwrap_or(10.0),
        entity.attr_f64("max_humidity").unwrap_or(90.0),
    )
}

/// Close at 0, open anywhere in 1..=100
fn opening_semantics(semantics: &mut Semantics) {
    semantics.add_states_to_value(&[Semantics::STATES_CLOSED], json!(0));
    semantics.add_states_to_range(&[Semantics::STATES_OPEN], 1, 100);
}

fn required_f64(entity: &Entity, attribute: &str) -> Result<f64, CapabilityError> {
    entity
        .attr_f64(attribute)
        .ok_or_else(|| CapabilityError::invalid(entity, attribute))
}

/// Numeric setting (cover and valve position, cover tilt, fan speed, humidity,
/// input numbers, vacuum fan speed)
pub struct RangeController {
    entity: Arc<Entity>,
    instance: String,
}

impl RangeController {
    pub fn new(entity: Arc<Entity>, instance: impl Into<String>) -> Self {
        Self {
            entity,
            instance: instance.into(),
        }
    }

    fn resource(&self) -> Result<Option<PresetResource>, CapabilityError> {
        let entity = &self.entity;
        let resource = match self.instance.as_str() {
            "cover.position" => {
                PresetResource::new(&["Position", catalog::SETTING_OPENING], 0.0, 100.0, 1.0)
                    .with_unit(Some(catalog::UNIT_PERCENT))
            }
            "cover.tilt" => PresetResource::new(
                &["Tilt", "Angle", catalog::SETTING_DIRECTION],
                0.0,
                100.0,
                1.0,
            )
            .with_unit(Some(catalog::UNIT_PERCENT)),
            "fan.speed" => {
                PresetResource::new(&["Percentage", catalog::SETTING_FAN_SPEED], 0.0, 100.0, 1.0)
                    .with_unit(Some(catalog::UNIT_PERCENT))
            }
            "humidifier.humidity" => {
                let (min, max) = humidity_bounds(entity);
                PresetResource::new(&["Humidity", "Percentage", "Target humidity"], min, max, 1.0)
                    .with_unit(Some(catalog::UNIT_PERCENT))
            }
            "valve.position" => {
                PresetResource::new(&["Opening", catalog::SETTING_OPENING], 0.0, 100.0, 1.0)
                    .with_unit(Some(catalog::UNIT_PERCENT))
            }
            "input_number.value" | "number.value" => {
                let min = required_f64(entity, "min")?;
                let max = required_f64(entity, "max")?;
                let step = entity.attr_f64("step").unwrap_or(1.0);
                let mut resource =
                    PresetResource::new(&["Value", catalog::SETTING_PRESET], min, max, step)
                        .with_unit(catalog_unit(entity));
                resource.add_preset(min, vec![catalog::VALUE_MINIMUM.to_string()]);
                resource.add_preset(max, vec![catalog::VALUE_MAXIMUM.to_string()]);
                resource
            }
            "vacuum.fan_speed" => {
                let speeds = entity.attr_list("fan_speed_list");
                if speeds.is_empty() {
                    return Err(CapabilityError::invalid(entity, "fan_speed_list"));
                }
                let max = speeds.len() - 1;
                let mut resource =
                    PresetResource::new(&[catalog::SETTING_FAN_SPEED], 0.0, max as f64, 1.0);
                for (index, speed) in speeds.iter().enumerate() {
                    let mut labels = vec![speed.replace('_', " ")];
                    if index == 1 {
                        labels.push(catalog::VALUE_MINIMUM.to_string());
                    }
                    if index == max {
                        labels.push(catalog::VALUE_MAXIMUM.to_string());
                    }
                    resource.add_preset(index as f64, labels);
                }
                resource
            }
            _ => return Ok(None),
        };
        Ok(Some(resource))
    }
}

impl Capability for RangeController {
    fn name(&self) -> &'static str {
        "Alexa.RangeController"
    }

    fn instance(&self) -> Option<&str> {
        Some(&self.instance)
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["rangeValue"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "rangeValue" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        // Unknown values are left to EndpointHealth
        let state = self.entity.state.as_str();
        if state == STATE_UNAVAILABLE || state == STATE_UNKNOWN {
            return Ok(None);
        }

        let value = match self.instance.as_str() {
            "cover.position" => self.entity.attr("current_position").cloned(),
            "cover.tilt" => self.entity.attr("current_tilt_position").cloned(),
            "fan.speed" => Some(json!(fan_percentage(&self.entity))),
            // No target humidity while off; 0 marks the value as unknown
            "humidifier.humidity" => {
                Some(self.entity.attr("humidity").cloned().unwrap_or(json!(0)))
            }
            "valve.position" => self.entity.attr("current_position").cloned(),
            "input_number.value" | "number.value" => {
                let value: f64 = state
                    .parse()
                    .map_err(|_| CapabilityError::invalid(&self.entity, "state"))?;
                Some(json!(value))
            }
            "vacuum.fan_speed" => {
                let speed = self.entity.attr_str("fan_speed");
                self.entity
                    .attr_list("fan_speed_list")
                    .iter()
                    .position(|s| Some(s.as_str()) == speed)
                    .map(|index| json!(index))
            }
            _ => None,
        };
        Ok(value)
    }

    fn capability_resources(&self) -> Option<Value> {
        self.resource()
            .ok()
            .flatten()
            .map(|r| r.serialize_capability_resources())
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        Ok(self.resource()?.map(|r| r.serialize_configuration()))
    }

    fn semantics(&self) -> Option<Value> {
        let mut semantics = Semantics::new();
        match self.instance.as_str() {
            "cover.position" => {
                let mut lower = vec![Semantics::ACTION_LOWER];
                let mut raise = vec![Semantics::ACTION_RAISE];
                // Open/close phrases belong to tilt when the cover has one
                if !has_feature(&self.entity, cover::SET_TILT_POSITION) {
                    lower.push(Semantics::ACTION_CLOSE);
                    raise.push(Semantics::ACTION_OPEN);
                    opening_semantics(&mut semantics);
                }
                semantics.add_action_to_directive(&lower, "SetRangeValue", json!({"rangeValue": 0}));
                semantics.add_action_to_directive(&raise, "SetRangeValue", json!({"rangeValue": 100}));
            }
            "cover.tilt" => {
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_CLOSE],
                    "SetRangeValue",
                    json!({"rangeValue": 0}),
                );
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_OPEN],
                    "SetRangeValue",
                    json!({"rangeValue": 100}),
                );
                opening_semantics(&mut semantics);
            }
            "fan.speed" => {
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_LOWER],
                    "SetRangeValue",
                    json!({"rangeValue": 0}),
                );
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_RAISE],
                    "SetRangeValue",
                    json!({"rangeValue": 100}),
                );
            }
            "humidifier.humidity" => {
                let (min, max) = humidity_bounds(&self.entity);
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_LOWER],
                    "SetRangeValue",
                    json!({"rangeValue": number(min)}),
                );
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_RAISE],
                    "SetRangeValue",
                    json!({"rangeValue": number(max)}),
                );
            }
            "valve.position" => {
                opening_semantics(&mut semantics);
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_CLOSE],
                    "SetRangeValue",
                    json!({"rangeValue": 0}),
                );
                semantics.add_action_to_directive(
                    &[Semantics::ACTION_OPEN],
                    "SetRangeValue",
                    json!({"rangeValue": 100}),
                );
            }
            _ => return None,
        }
        Some(semantics.serialize())
    }
}

/// Named modes (fan direction/preset, humidifier mode, remote activity,
/// cover and valve position, water heater operation)
pub struct ModeController {
    entity: Arc<Entity>,
    instance: String,
}

impl ModeController {
    pub fn new(entity: Arc<Entity>, instance: impl Into<String>) -> Self {
        Self {
            entity,
            instance: instance.into(),
        }
    }

    /// Modes taken from an attribute list, padded when only one exists
    fn list_resource(&self, prefix: &str, list_attribute: &str) -> ModeResource {
        let label = if prefix == "preset_mode" {
            catalog::SETTING_PRESET
        } else {
            catalog::SETTING_MODE
        };
        let mut resource = ModeResource::new(&[label], false);
        for mode in self.entity.attr_list(list_attribute) {
            resource.add_mode(format!("{}.{}", prefix, mode), &[mode.as_str()]);
        }
        // A single mode breaks discovery on the Alexa side
        if resource.mode_count() == 1 {
            resource.add_mode(format!("{}.{}", prefix, PRESET_MODE_NA), &[PRESET_MODE_NA]);
        }
        resource
    }

    fn resource(&self) -> Option<ModeResource> {
        let resource = match self.instance.as_str() {
            "fan.direction" => {
                let mut resource = ModeResource::new(&[catalog::SETTING_DIRECTION], false);
                resource.add_mode("direction.forward", &["forward"]);
                resource.add_mode("direction.reverse", &["reverse"]);
                resource
            }
            "fan.preset_mode" => self.list_resource("preset_mode", "preset_modes"),
            "humidifier.mode" => self.list_resource("mode", "available_modes"),
            // Activities are free-form names, which InputController cannot carry
            "remote.activity" => self.list_resource("activity", "activity_list"),
            "water_heater.operation_mode" => {
                self.list_resource("operation_mode", "operation_list")
            }
            "valve.state" => {
                let mut resource = ModeResource::new(&["Preset", catalog::SETTING_PRESET], false);
                if has_feature(&self.entity, valve::OPEN) {
                    resource.add_mode("state.open", &["Open", catalog::SETTING_PRESET]);
                }
                if has_feature(&self.entity, valve::CLOSE) {
                    resource.add_mode("state.closed", &["Closed", catalog::SETTING_PRESET]);
                }
                // Alexa needs at least two modes
                if resource.mode_count() == 1 {
                    resource.add_mode(format!("state.{}", PRESET_MODE_NA), &[PRESET_MODE_NA]);
                }
                resource
            }
            "cover.position" => {
                let mut resource =
                    ModeResource::new(&["Position", catalog::SETTING_OPENING], false);
                resource.add_mode("position.open", &[catalog::VALUE_OPEN]);
                resource.add_mode("position.closed", &[catalog::VALUE_CLOSE]);
                resource.add_mode("position.custom", &["Custom", catalog::SETTING_PRESET]);
                resource
            }
            _ => return None,
        };
        Some(resource)
    }

    fn mode_in_list(&self, prefix: &str, attribute: &str, list_attribute: &str) -> Option<Value> {
        let mode = self.entity.attr_str(attribute)?;
        self.entity
            .attr_list(list_attribute)
            .iter()
            .any(|m| m == mode)
            .then(|| json!(format!("{}.{}", prefix, mode)))
    }
}

impl Capability for ModeController {
    fn name(&self) -> &'static str {
        "Alexa.ModeController"
    }

    fn instance(&self) -> Option<&str> {
        Some(&self.instance)
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["mode"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "mode" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let value = match self.instance.as_str() {
            "fan.direction" => match self.entity.attr_str("direction") {
                Some(mode @ ("forward" | "reverse" | "unknown")) => {
                    Some(json!(format!("direction.{}", mode)))
                }
                _ => None,
            },
            "fan.preset_mode" => self.mode_in_list("preset_mode", "preset_mode", "preset_modes"),
            "humidifier.mode" => self.mode_in_list("mode", "mode", "available_modes"),
            "remote.activity" => {
                self.mode_in_list("activity", "current_activity", "activity_list")
            }
            "water_heater.operation_mode" => {
                self.mode_in_list("operation_mode", "operation_mode", "operation_list")
            }
            // Position mode reports the cover state rather than a position
            "cover.position" => match self.entity.state.as_str() {
                mode @ ("open" | "opening" | "closed" | "closing" | "unknown") => {
                    Some(json!(format!("position.{}", mode)))
                }
                _ => None,
            },
            "valve.state" => match self.entity.state.as_str() {
                state @ ("open" | "opening" | "closed" | "closing" | "unknown") => {
                    Some(json!(format!("state.{}", state)))
                }
                _ => None,
            },
            _ => None,
        };
        Ok(value)
    }

    fn capability_resources(&self) -> Option<Value> {
        self.resource().map(|r| r.serialize_capability_resources())
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        Ok(self.resource().map(|r| r.serialize_configuration()))
    }

    fn semantics(&self) -> Option<Value> {
        let mut semantics = Semantics::new();
        if self.instance == "valve.state" {
            semantics.add_states_to_value(&[Semantics::STATES_CLOSED], json!("state.closed"));
            semantics.add_states_to_value(&[Semantics::STATES_OPEN], json!("state.open"));
            semantics.add_action_to_directive(
                &[Semantics::ACTION_CLOSE],
                "SetMode",
                json!({"mode": "state.closed"}),
            );
            semantics.add_action_to_directive(
                &[Semantics::ACTION_OPEN],
                "SetMode",
                json!({"mode": "state.open"}),
            );
            return Some(semantics.serialize());
        }
        if self.instance != "cover.position" {
            return None;
        }

        let mut lower = vec![Semantics::ACTION_LOWER];
        let mut raise = vec![Semantics::ACTION_RAISE];
        if !has_feature(&self.entity, cover::SET_TILT_POSITION) {
            lower.push(Semantics::ACTION_CLOSE);
            raise.push(Semantics::ACTION_OPEN);
            semantics.add_states_to_value(&[Semantics::STATES_CLOSED], json!("position.closed"));
            semantics.add_states_to_value(&[Semantics::STATES_OPEN], json!("position.open"));
        }
        semantics.add_action_to_directive(&lower, "SetMode", json!({"mode": "position.closed"}));
        semantics.add_action_to_directive(&raise, "SetMode", json!({"mode": "position.open"}));
        Some(semantics.serialize())
    }
}

/// Binary setting such as fan oscillation or stopping a valve
pub struct ToggleController {
    entity: Arc<Entity>,
    instance: String,
}

impl ToggleController {
    pub fn new(entity: Arc<Entity>, instance: impl Into<String>) -> Self {
        Self {
            entity,
            instance: instance.into(),
        }
    }
}

impl Capability for ToggleController {
    fn name(&self) -> &'static str {
        "Alexa.ToggleController"
    }

    fn instance(&self) -> Option<&str> {
        Some(&self.instance)
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["toggleState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "toggleState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        match self.instance.as_str() {
            "fan.oscillating" => {
                let on = self.entity.attr_bool("oscillating").unwrap_or(false);
                Ok(Some(json!(if on { "ON" } else { "OFF" })))
            }
            // Stopping is momentary
            "valve.stop" => Ok(Some(json!("OFF"))),
            _ => Ok(None),
        }
    }

    fn capability_resources(&self) -> Option<Value> {
        let labels: &[&str] = match self.instance.as_str() {
            "fan.oscillating" => &[catalog::SETTING_OSCILLATE, "Rotate", "Rotation"],
            "valve.stop" => &["Stop"],
            _ => return None,
        };
        Some(json!({ "friendlyNames": serialize_labels(labels) }))
    }
}

/// Percentage of fans (speed tier) and covers (position)
pub struct PercentageController {
    entity: Arc<Entity>,
}

impl PercentageController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for PercentageController {
    fn name(&self) -> &'static str {
        "Alexa.PercentageController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["percentage"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "percentage" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        match self.entity.domain() {
            "fan" => Ok(Some(json!(fan_percentage(&self.entity)))),
            "cover" => Ok(self.entity.attr("current_position").cloned()),
            _ => Ok(None),
        }
    }
}

pub struct PowerLevelController {
    entity: Arc<Entity>,
}

impl PowerLevelController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for PowerLevelController {
    fn name(&self) -> &'static str {
        "Alexa.PowerLevelController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["powerLevel"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "powerLevel" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        if self.entity.domain() == "fan" {
            return Ok(Some(json!(fan_percentage(&self.entity))));
        }
        Ok(None)
    }
}
