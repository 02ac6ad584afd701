use super::{call, payload_delta, required_attr, target, RequestContext};
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{value_f64, Directive, Response};
use crate::config::SmartHomeConfig;
use serde_json::json;
use std::sync::Arc;

/// Mired step for one "warmer"/"cooler" request
const COLOR_TEMP_STEP_MIREDS: i64 = 50;

pub async fn set_brightness(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let brightness = directive.payload_f64("brightness")? as i64;

    let mut data = target(entity);
    data.insert("brightness_pct".into(), json!(brightness));
    call(config, context, entity.domain(), "turn_on", data).await?;

    Ok(directive.response())
}

pub async fn adjust_brightness(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let delta = payload_delta(directive, "brightnessDelta", 100)?;

    // Missing brightness (light off) counts as 0%
    let current = entity
        .attr_f64("brightness")
        .map(|b| (b / 255.0 * 100.0).floor() as i64)
        .unwrap_or(0);
    let brightness = current.saturating_add(delta).clamp(0, 100);

    let mut data = target(entity);
    data.insert("brightness_pct".into(), json!(brightness));
    call(config, context, entity.domain(), "turn_on", data).await?;

    Ok(directive.response())
}

pub async fn set_color(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let color = directive
        .payload
        .get("color")
        .ok_or_else(|| AlexaError::InvalidValue("Missing or invalid color".into()))?;
    let component = |key: &str| {
        value_f64(color.get(key))
            .ok_or_else(|| AlexaError::InvalidValue(format!("Missing or invalid color.{}", key)))
    };

    let hue = component("hue")?;
    let saturation = component("saturation")?;
    let brightness = component("brightness")?;

    let mut data = target(entity);
    data.insert("hs_color".into(), json!([hue, saturation * 100.0]));
    data.insert("brightness".into(), json!((brightness * 255.0).round() as i64));
    call(config, context, entity.domain(), "turn_on", data).await?;

    Ok(directive.response())
}

pub async fn set_color_temperature(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let kelvin = directive.payload_f64("colorTemperatureInKelvin")? as i64;

    let mut data = target(entity);
    data.insert("kelvin".into(), json!(kelvin));
    call(config, context, entity.domain(), "turn_on", data).await?;

    Ok(directive.response())
}

/// Cooler light: fewer mireds, bounded by `min_mireds`
pub async fn increase_color_temperature(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let current = required_attr(entity, "color_temp")? as i64;
    let min_mireds = required_attr(entity, "min_mireds")? as i64;

    let mut data = target(entity);
    data.insert(
        "color_temp".into(),
        json!(current.saturating_sub(COLOR_TEMP_STEP_MIREDS).max(min_mireds)),
    );
    call(config, context, entity.domain(), "turn_on", data).await?;

    Ok(directive.response())
}

/// Warmer light: more mireds, bounded by `max_mireds`
pub async fn decrease_color_temperature(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let current = required_attr(entity, "color_temp")? as i64;
    let max_mireds = required_attr(entity, "max_mireds")? as i64;

    let mut data = target(entity);
    data.insert(
        "color_temp".into(),
        json!(current.saturating_add(COLOR_TEMP_STEP_MIREDS).min(max_mireds)),
    );
    call(config, context, entity.domain(), "turn_on", data).await?;

    Ok(directive.response())
}
