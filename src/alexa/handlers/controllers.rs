use super::{call, not_supported, payload_delta, required_attr, target, RequestContext};
use crate::alexa::capabilities::{fan_percentage, fan_speed_tier, has_feature};
use crate::alexa::consts::features::{cover, fan, valve};
use crate::alexa::consts::PRESET_MODE_NA;
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{Directive, PropertyReport, Response};
use crate::config::SmartHomeConfig;
use crate::state::Entity;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Percentage moved by one "raise"/"lower" without an explicit amount
const DEFAULT_RANGE_STEP: f64 = 20.0;

/// Humidity moved by one "raise"/"lower" without an explicit amount
const DEFAULT_HUMIDITY_STEP: f64 = 5.0;

fn instance(directive: &Directive) -> &str {
    directive.instance.as_deref().unwrap_or_default()
}

/// "direction.forward" -> "forward"
fn mode_suffix(mode: &str) -> HandlerResult<&str> {
    mode.split_once('.')
        .map(|(_, value)| value)
        .ok_or_else(|| AlexaError::InvalidValue(format!("Malformed mode {}", mode)))
}

/// Mode from an attribute list; the "-" placeholder is never selectable
fn listed_mode<'a>(entity: &Entity, value: &'a str, list_attribute: &str) -> HandlerResult<&'a str> {
    if value != PRESET_MODE_NA && entity.attr_list(list_attribute).iter().any(|m| m == value) {
        Ok(value)
    } else {
        Err(AlexaError::InvalidValue(format!(
            "Entity '{}' does not support mode '{}'",
            entity.entity_id, value
        )))
    }
}

pub async fn set_mode(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let instance = instance(directive);
    let mode = directive.payload_str("mode")?;
    let value = mode_suffix(mode)?;

    let mut data = target(entity);
    let service = match instance {
        "fan.direction" => match value {
            "forward" | "reverse" => {
                data.insert("direction".into(), json!(value));
                "set_direction"
            }
            _ => return Err(not_supported()),
        },
        "fan.preset_mode" => {
            data.insert(
                "preset_mode".into(),
                json!(listed_mode(entity, value, "preset_modes")?),
            );
            "set_preset_mode"
        }
        "humidifier.mode" => {
            data.insert(
                "mode".into(),
                json!(listed_mode(entity, value, "available_modes")?),
            );
            "set_mode"
        }
        "remote.activity" => {
            data.insert(
                "activity".into(),
                json!(listed_mode(entity, value, "activity_list")?),
            );
            "turn_on"
        }
        "water_heater.operation_mode" => {
            data.insert(
                "operation_mode".into(),
                json!(listed_mode(entity, value, "operation_list")?),
            );
            "set_operation_mode"
        }
        "cover.position" => match value {
            "closed" => "close_cover",
            "open" => "open_cover",
            "custom" => "stop_cover",
            _ => return Err(not_supported()),
        },
        "valve.state" => match value {
            "closed" => "close_valve",
            "open" => "open_valve",
            _ => return Err(not_supported()),
        },
        _ => return Err(not_supported()),
    };
    call(config, context, entity.domain(), service, data).await?;

    let mut response = directive.response();
    response.add_context_property(
        PropertyReport::new("Alexa.ModeController", "mode", json!(mode))
            .with_instance(Some(instance)),
    );
    Ok(response)
}

/// No mode resource is ordered, so relative changes are never possible
pub async fn adjust_mode(
    _config: &Arc<SmartHomeConfig>,
    _directive: &Directive,
    _context: &RequestContext,
) -> HandlerResult<Response> {
    Err(not_supported())
}

async fn toggle(
    config: &SmartHomeConfig,
    directive: &Directive,
    context: &RequestContext,
    on: bool,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let instance = instance(directive);

    let mut data = target(entity);
    let service = match instance {
        "fan.oscillating" => {
            data.insert("oscillating".into(), json!(on));
            "oscillate"
        }
        // Stop is a one-shot action, there is nothing to turn off
        "valve.stop" if on => "stop_valve",
        _ => return Err(not_supported()),
    };
    call(config, context, entity.domain(), service, data).await?;

    let mut response = directive.response();
    response.add_context_property(
        PropertyReport::new(
            "Alexa.ToggleController",
            "toggleState",
            json!(if on { "ON" } else { "OFF" }),
        )
        .with_instance(Some(instance)),
    );
    Ok(response)
}

pub async fn toggle_on(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    toggle(config, directive, context, true).await
}

pub async fn toggle_off(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    toggle(config, directive, context, false).await
}

/// Service plus the value reported back as `rangeValue`
struct RangeCommand {
    service: &'static str,
    data: Map<String, Value>,
    value: Value,
}

impl RangeCommand {
    fn new(entity: &Entity, service: &'static str, value: Value) -> Self {
        Self {
            service,
            data: target(entity),
            value,
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// Open/close at the ends of the range when the cover supports it
fn cover_range(entity: &Entity, position: i64, tilt: bool) -> RangeCommand {
    let (close, open, close_service, open_service, set_service, key) = if tilt {
        (
            cover::CLOSE_TILT,
            cover::OPEN_TILT,
            "close_cover_tilt",
            "open_cover_tilt",
            "set_cover_tilt_position",
            "tilt_position",
        )
    } else {
        (
            cover::CLOSE,
            cover::OPEN,
            "close_cover",
            "open_cover",
            "set_cover_position",
            "position",
        )
    };

    if position == 0 && has_feature(entity, close) {
        RangeCommand::new(entity, close_service, json!(position))
    } else if position == 100 && has_feature(entity, open) {
        RangeCommand::new(entity, open_service, json!(position))
    } else {
        RangeCommand::new(entity, set_service, json!(position)).with(key, json!(position))
    }
}

/// Open/close at the ends when the valve supports it
fn valve_range(entity: &Entity, position: i64) -> RangeCommand {
    if position == 0 && has_feature(entity, valve::CLOSE) {
        RangeCommand::new(entity, "close_valve", json!(position))
    } else if position == 100 && has_feature(entity, valve::OPEN) {
        RangeCommand::new(entity, "open_valve", json!(position))
    } else {
        RangeCommand::new(entity, "set_valve_position", json!(position))
            .with("position", json!(position))
    }
}

fn humidity_bounds(entity: &Entity) -> (i64, i64) {
    (
        entity.attr_f64("min_humidity").unwrap_or(10.0) as i64,
        entity.attr_f64("max_humidity").unwrap_or(90.0) as i64,
    )
}

fn number_bounds(entity: &Entity) -> HandlerResult<(f64, f64)> {
    Ok((required_attr(entity, "min")?, required_attr(entity, "max")?))
}

fn fan_speeds(entity: &Entity) -> HandlerResult<Vec<String>> {
    let speeds = entity.attr_list("fan_speed_list");
    if speeds.is_empty() {
        return Err(AlexaError::InvalidValue(format!(
            "{} has no fan speeds",
            entity.entity_id
        )));
    }
    Ok(speeds)
}

async fn send_range(
    config: &SmartHomeConfig,
    directive: &Directive,
    context: &RequestContext,
    command: RangeCommand,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    call(config, context, entity.domain(), command.service, command.data).await?;

    let mut response = directive.response();
    response.add_context_property(
        PropertyReport::new("Alexa.RangeController", "rangeValue", command.value)
            .with_instance(Some(instance(directive))),
    );
    Ok(response)
}

pub async fn set_range(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let range_value = directive.payload_f64("rangeValue")?;

    let command = match instance(directive) {
        "cover.position" => cover_range(entity, range_value as i64, false),
        "cover.tilt" => cover_range(entity, range_value as i64, true),
        "fan.speed" => {
            let percentage = range_value as i64;
            if percentage == 0 {
                RangeCommand::new(entity, "turn_off", json!(percentage))
            } else if has_feature(entity, fan::SET_SPEED) {
                RangeCommand::new(entity, "set_percentage", json!(percentage))
                    .with("percentage", json!(percentage))
            } else {
                RangeCommand::new(entity, "turn_on", json!(percentage))
            }
        }
        "humidifier.humidity" => {
            let humidity = range_value as i64;
            RangeCommand::new(entity, "set_humidity", json!(humidity))
                .with("humidity", json!(humidity))
        }
        "valve.position" => valve_range(entity, range_value as i64),
        "input_number.value" | "number.value" => {
            let (min, max) = number_bounds(entity)?;
            let value = range_value.max(min).min(max);
            RangeCommand::new(entity, "set_value", json!(value)).with("value", json!(value))
        }
        "vacuum.fan_speed" => {
            let speeds = fan_speeds(entity)?;
            let index = range_value as i64;
            let speed = usize::try_from(index)
                .ok()
                .and_then(|i| speeds.get(i))
                .ok_or_else(|| AlexaError::InvalidValue("Entity does not support value".into()))?;
            RangeCommand::new(entity, "set_fan_speed", json!(index)).with("fan_speed", json!(speed))
        }
        _ => return Err(not_supported()),
    };

    send_range(config, directive, context, command).await
}

/// Current percentage-like attribute; absent or 0 cannot be adjusted from
fn adjustable(entity: &Entity, attribute: &str) -> HandlerResult<i64> {
    match entity.attr_f64(attribute) {
        Some(current) if current != 0.0 => Ok(current as i64),
        _ => Err(AlexaError::InvalidValue(format!(
            "Unable to determine {} current {}",
            entity.entity_id, attribute
        ))),
    }
}

pub async fn adjust_range(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let delta = directive.payload_f64("rangeValueDelta")?;
    let use_default = directive.payload_bool("rangeValueDeltaDefault");
    // Every percentage-like range is 0..=100, so wider deltas saturate
    let scaled = |step: f64| {
        let delta = if use_default { delta * step } else { delta };
        delta.clamp(-100.0, 100.0) as i64
    };

    let command = match instance(directive) {
        "cover.position" | "cover.tilt" => {
            let tilt = instance(directive) == "cover.tilt";
            let attribute = if tilt {
                "current_tilt_position"
            } else {
                "current_position"
            };
            let position = adjustable(entity, attribute)?
                .saturating_add(scaled(DEFAULT_RANGE_STEP))
                .clamp(0, 100);
            // The ends always map to open/close, whatever the feature flags say
            let (service, key) = match (position, tilt) {
                (100, false) => ("open_cover", None),
                (0, false) => ("close_cover", None),
                (100, true) => ("open_cover_tilt", None),
                (0, true) => ("close_cover_tilt", None),
                (_, false) => ("set_cover_position", Some("position")),
                (_, true) => ("set_cover_tilt_position", Some("tilt_position")),
            };
            let command = RangeCommand::new(entity, service, json!(position));
            match key {
                Some(key) => command.with(key, json!(position)),
                None => command,
            }
        }
        "fan.speed" => {
            let step = entity
                .attr_f64("percentage_step")
                .filter(|s| *s > 0.0)
                .unwrap_or(DEFAULT_RANGE_STEP);
            let percentage = adjustable(entity, "percentage")?
                .saturating_add(scaled(step))
                .clamp(0, 100);
            if percentage == 0 {
                RangeCommand::new(entity, "turn_off", json!(percentage))
            } else {
                RangeCommand::new(entity, "set_percentage", json!(percentage))
                    .with("percentage", json!(percentage))
            }
        }
        "humidifier.humidity" => {
            let (min, max) = humidity_bounds(entity);
            let humidity = adjustable(entity, "humidity")?
                .saturating_add(scaled(DEFAULT_HUMIDITY_STEP))
                .max(min)
                .min(max);
            RangeCommand::new(entity, "set_humidity", json!(humidity))
                .with("humidity", json!(humidity))
        }
        "valve.position" => {
            let position = adjustable(entity, "current_position")?
                .saturating_add(scaled(DEFAULT_RANGE_STEP))
                .clamp(0, 100);
            // Like covers, the ends always open or close
            match position {
                100 => RangeCommand::new(entity, "open_valve", json!(position)),
                0 => RangeCommand::new(entity, "close_valve", json!(position)),
                _ => RangeCommand::new(entity, "set_valve_position", json!(position))
                    .with("position", json!(position)),
            }
        }
        "input_number.value" | "number.value" => {
            let (min, max) = number_bounds(entity)?;
            let current: f64 = entity.state.parse().map_err(|_| {
                AlexaError::InvalidValue(format!(
                    "Unable to determine {} current value",
                    entity.entity_id
                ))
            })?;
            let value = (current + delta).max(min).min(max);
            RangeCommand::new(entity, "set_value", json!(value)).with("value", json!(value))
        }
        "vacuum.fan_speed" => {
            let speeds = fan_speeds(entity)?;
            let current_speed = entity.attr_str("fan_speed");
            let current = speeds
                .iter()
                .position(|s| Some(s.as_str()) == current_speed)
                .unwrap_or(0) as i64;
            let last = speeds.len() as i64 - 1;
            let step = delta.clamp(-(last as f64), last as f64) as i64;
            let index = (current + step).clamp(0, last);
            RangeCommand::new(entity, "set_fan_speed", json!(index))
                .with("fan_speed", json!(speeds[index as usize]))
        }
        _ => return Err(not_supported()),
    };

    send_range(config, directive, context, command).await
}

/// Percentage applied to a fan (as a speed tier) or a cover position
async fn apply_percentage(
    config: &SmartHomeConfig,
    directive: &Directive,
    context: &RequestContext,
    percentage: i64,
    covers: bool,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let mut data = target(entity);

    let service = match entity.domain() {
        "fan" => {
            data.insert("speed".into(), json!(fan_speed_tier(percentage)));
            "set_speed"
        }
        "cover" if covers => {
            data.insert("position".into(), json!(percentage));
            "set_cover_position"
        }
        _ => return Err(not_supported()),
    };
    call(config, context, entity.domain(), service, data).await?;

    Ok(directive.response())
}

/// Current percentage for relative changes, clamped after adding `delta`
fn adjusted_percentage(entity: &Entity, delta: i64) -> HandlerResult<i64> {
    let current = match entity.domain() {
        "cover" => required_attr(entity, "current_position")? as i64,
        _ => fan_percentage(entity),
    };
    Ok(current.saturating_add(delta).clamp(0, 100))
}

pub async fn set_percentage(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let percentage = directive.payload_f64("percentage")? as i64;
    apply_percentage(config, directive, context, percentage, true).await
}

pub async fn adjust_percentage(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let delta = payload_delta(directive, "percentageDelta", 100)?;
    let percentage = adjusted_percentage(directive.entity()?, delta)?;
    apply_percentage(config, directive, context, percentage, true).await
}

pub async fn set_power_level(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let level = directive.payload_f64("powerLevel")? as i64;
    apply_percentage(config, directive, context, level, false).await
}

pub async fn adjust_power_level(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let delta = payload_delta(directive, "powerLevelDelta", 100)?;
    let level = adjusted_percentage(directive.entity()?, delta)?;
    apply_percentage(config, directive, context, level, false).await
}
