use super::{call, required_attr, target, RequestContext};
use crate::alexa::consts::{
    reverse_lookup, TempUnit, THERMOSTAT_MODES, THERMOSTAT_MODES_CUSTOM, THERMOSTAT_PRESETS,
};
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{value_f64, Directive, PropertyReport, Response};
use crate::config::SmartHomeConfig;
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;

const NAMESPACE: &str = "Alexa.ThermostatController";

/// Temperature object (`{"value", "scale"}`) in the backend's unit.
///
/// Absolute Kelvin values are shifted to Celsius first. Kelvin intervals
/// are applied as raw units with no offset or scaling; Celsius and
/// Fahrenheit intervals scale by 1.8 between the two.
pub fn temperature_from_object(temp: &Value, unit: TempUnit, interval: bool) -> HandlerResult<f64> {
    let mut value = value_f64(temp.get("value"))
        .ok_or_else(|| AlexaError::InvalidValue("Missing or invalid temperature value".into()))?;

    let from = match temp.get("scale").and_then(Value::as_str) {
        Some("FAHRENHEIT") => TempUnit::Fahrenheit,
        Some("KELVIN") if interval => return Ok(value),
        Some("KELVIN") => {
            value -= 273.15;
            TempUnit::Celsius
        }
        _ => TempUnit::Celsius,
    };

    let converted = match (from, unit) {
        (TempUnit::Celsius, TempUnit::Fahrenheit) if interval => value * 1.8,
        (TempUnit::Celsius, TempUnit::Fahrenheit) => value * 9.0 / 5.0 + 32.0,
        (TempUnit::Fahrenheit, TempUnit::Celsius) if interval => value / 1.8,
        (TempUnit::Fahrenheit, TempUnit::Celsius) => (value - 32.0) * 5.0 / 9.0,
        _ => value,
    };
    Ok(converted)
}

/// Entity's valid setpoint range
fn bounds(entity: &Entity) -> HandlerResult<(f64, f64)> {
    Ok((required_attr(entity, "min_temp")?, required_attr(entity, "max_temp")?))
}

fn check_range(temperature: f64, (min, max): (f64, f64), unit: TempUnit) -> HandlerResult<()> {
    if temperature < min || temperature > max {
        return Err(AlexaError::TempRange {
            temperature,
            min,
            max,
            unit,
        });
    }
    Ok(())
}

fn setpoint_property(name: &str, temperature: f64, unit: TempUnit) -> PropertyReport {
    PropertyReport::new(
        NAMESPACE,
        name,
        json!({"value": temperature, "scale": unit.api_name()}),
    )
}

/// Payload setpoint -> backend attribute
const SETPOINTS: &[(&str, &str)] = &[
    ("targetSetpoint", "temperature"),
    ("lowerSetpoint", "target_temp_low"),
    ("upperSetpoint", "target_temp_high"),
];

pub async fn set_target_temperature(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let unit = config.settings().temperature_unit;
    let range = bounds(entity)?;

    let mut data = target(entity);
    let mut response = directive.response();

    // Every setpoint is validated before anything reaches the backend
    for (setpoint, attribute) in SETPOINTS {
        let Some(object) = directive.payload.get(*setpoint) else {
            continue;
        };
        let temperature = temperature_from_object(object, unit, false)?;
        check_range(temperature, range, unit)?;

        data.insert((*attribute).into(), json!(temperature));
        response.add_context_property(setpoint_property(setpoint, temperature, unit));
    }

    if data.len() == 1 {
        return Err(AlexaError::InvalidValue("No setpoint in payload".into()));
    }

    call(config, context, entity.domain(), "set_temperature", data).await?;
    Ok(response)
}

/// Shift the current setpoint(s) by an interval
pub async fn adjust_target_temperature(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let unit = config.settings().temperature_unit;
    let range = bounds(entity)?;

    let delta_object = directive
        .payload
        .get("targetSetpointDelta")
        .ok_or_else(|| AlexaError::InvalidValue("Missing targetSetpointDelta".into()))?;
    let delta = temperature_from_object(delta_object, unit, true)?;

    let mut data = target(entity);
    let mut response = directive.response();

    match (entity.attr_f64("target_temp_high"), entity.attr_f64("target_temp_low")) {
        (Some(high), Some(low)) => {
            let high = high + delta;
            check_range(high, range, unit)?;
            let low = low + delta;
            check_range(low, range, unit)?;

            data.insert("target_temp_high".into(), json!(high));
            data.insert("target_temp_low".into(), json!(low));
            response.add_context_property(setpoint_property("upperSetpoint", high, unit));
            response.add_context_property(setpoint_property("lowerSetpoint", low, unit));
        }
        _ => {
            let current = entity.attr_f64("temperature").ok_or_else(|| {
                AlexaError::UnsupportedThermostatTargetState(
                    "The current target temperature is not set, cannot adjust target temperature"
                        .into(),
                )
            })?;
            let temperature = current + delta;
            check_range(temperature, range, unit)?;

            data.insert("temperature".into(), json!(temperature));
            response.add_context_property(setpoint_property("targetSetpoint", temperature, unit));
        }
    }

    call(config, context, entity.domain(), "set_temperature", data).await?;
    Ok(response)
}

/// Presets take priority, then CUSTOM names, then the ordered HVAC mode table
pub async fn set_thermostat_mode(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let requested = directive
        .payload
        .get("thermostatMode")
        .ok_or_else(|| AlexaError::InvalidValue("Missing thermostatMode".into()))?;
    let mode = match requested {
        Value::String(mode) => mode.as_str(),
        other => other
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| AlexaError::InvalidValue("Missing or invalid thermostatMode".into()))?,
    };

    let mut data = target(entity);
    let service = if let Some((preset, _)) = THERMOSTAT_PRESETS.iter().find(|(_, m)| *m == mode) {
        if !entity.attr_list("preset_modes").iter().any(|p| p == preset) {
            return Err(AlexaError::UnsupportedThermostatMode(format!(
                "The requested thermostat mode {} is not supported",
                preset
            )));
        }
        data.insert("preset_mode".into(), json!(preset));
        "set_preset_mode"
    } else {
        let hvac_modes = entity.attr_list("hvac_modes");
        let hvac_mode = if mode == "CUSTOM" {
            let custom_name = requested.get("customName").and_then(Value::as_str).unwrap_or("");
            reverse_lookup(THERMOSTAT_MODES_CUSTOM, custom_name, &hvac_modes).ok_or_else(|| {
                AlexaError::UnsupportedThermostatMode(format!(
                    "The requested thermostat mode {}: {} is not supported",
                    mode, custom_name
                ))
            })?
        } else {
            reverse_lookup(THERMOSTAT_MODES, mode, &hvac_modes).ok_or_else(|| {
                AlexaError::UnsupportedThermostatMode(format!(
                    "The requested thermostat mode {} is not supported",
                    mode
                ))
            })?
        };
        data.insert("hvac_mode".into(), json!(hvac_mode));
        "set_hvac_mode"
    };

    call(config, context, "climate", service, data).await?;

    let mut response = directive.response();
    response.add_context_property(PropertyReport::new(NAMESPACE, "thermostatMode", json!(mode)));
    Ok(response)
}
