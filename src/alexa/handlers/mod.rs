//! Directive handlers.
//!
//! Each handler turns one `(namespace, name)` directive into backend service
//! calls and a [`Response`]. Handlers return typed [`AlexaError`]s and never
//! build ErrorResponse events themselves.

mod basic;
mod climate;
mod controllers;
mod lighting;
mod media;
mod security;

pub use climate::temperature_from_object;

use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{Directive, Response};
use crate::config::SmartHomeConfig;
use crate::state::{Entity, ServiceCall};
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

pub(crate) const DIRECTIVE_NOT_SUPPORTED: &str = "Entity does not support directive";

/// Most backend calls one directive may repeat (volume steps, channel skips)
pub(crate) const MAX_REPEATED_CALLS: u64 = 100;

/// Request-scoped context passed to every backend call of one directive
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub type Handler = for<'a> fn(
    &'a Arc<SmartHomeConfig>,
    &'a Directive,
    &'a RequestContext,
) -> BoxFuture<'a, HandlerResult<Response>>;

/// Wrap an `async fn` into a [`Handler`] pointer
macro_rules! handler {
    ($f:path) => {{
        fn wrapper<'a>(
            config: &'a Arc<SmartHomeConfig>,
            directive: &'a Directive,
            context: &'a RequestContext,
        ) -> BoxFuture<'a, HandlerResult<Response>> {
            Box::pin($f(config, directive, context))
        }
        wrapper as Handler
    }};
}

/// Dispatch table keyed by (namespace, name)
static HANDLERS: &[(&str, &str, Handler)] = &[
    ("Alexa.Discovery", "Discover", handler!(basic::discover)),
    ("Alexa.Authorization", "AcceptGrant", handler!(basic::accept_grant)),
    ("Alexa", "ReportState", handler!(basic::report_state)),
    ("Alexa.PowerController", "TurnOn", handler!(basic::turn_on)),
    ("Alexa.PowerController", "TurnOff", handler!(basic::turn_off)),
    ("Alexa.SceneController", "Activate", handler!(basic::activate)),
    ("Alexa.SceneController", "Deactivate", handler!(basic::deactivate)),
    ("Alexa.LockController", "Lock", handler!(basic::lock)),
    ("Alexa.LockController", "Unlock", handler!(basic::unlock)),
    ("Alexa.TimeHoldController", "Hold", handler!(basic::hold)),
    ("Alexa.TimeHoldController", "Resume", handler!(basic::resume)),
    ("Alexa.BrightnessController", "SetBrightness", handler!(lighting::set_brightness)),
    ("Alexa.BrightnessController", "AdjustBrightness", handler!(lighting::adjust_brightness)),
    ("Alexa.ColorController", "SetColor", handler!(lighting::set_color)),
    (
        "Alexa.ColorTemperatureController",
        "SetColorTemperature",
        handler!(lighting::set_color_temperature),
    ),
    (
        "Alexa.ColorTemperatureController",
        "IncreaseColorTemperature",
        handler!(lighting::increase_color_temperature),
    ),
    (
        "Alexa.ColorTemperatureController",
        "DecreaseColorTemperature",
        handler!(lighting::decrease_color_temperature),
    ),
    (
        "Alexa.ThermostatController",
        "SetTargetTemperature",
        handler!(climate::set_target_temperature),
    ),
    (
        "Alexa.ThermostatController",
        "AdjustTargetTemperature",
        handler!(climate::adjust_target_temperature),
    ),
    ("Alexa.ThermostatController", "SetThermostatMode", handler!(climate::set_thermostat_mode)),
    ("Alexa.SecurityPanelController", "Arm", handler!(security::arm)),
    ("Alexa.SecurityPanelController", "Disarm", handler!(security::disarm)),
    ("Alexa.Speaker", "SetVolume", handler!(media::set_volume)),
    ("Alexa.Speaker", "AdjustVolume", handler!(media::adjust_volume)),
    ("Alexa.Speaker", "SetMute", handler!(media::set_mute)),
    ("Alexa.StepSpeaker", "AdjustVolume", handler!(media::adjust_volume_steps)),
    ("Alexa.StepSpeaker", "SetMute", handler!(media::set_mute)),
    ("Alexa.PlaybackController", "Play", handler!(media::play)),
    ("Alexa.PlaybackController", "Pause", handler!(media::pause)),
    ("Alexa.PlaybackController", "Stop", handler!(media::stop)),
    ("Alexa.PlaybackController", "Next", handler!(media::next)),
    ("Alexa.PlaybackController", "Previous", handler!(media::previous)),
    ("Alexa.InputController", "SelectInput", handler!(media::select_input)),
    ("Alexa.ChannelController", "ChangeChannel", handler!(media::change_channel)),
    ("Alexa.ChannelController", "SkipChannels", handler!(media::skip_channels)),
    ("Alexa.SeekController", "AdjustSeekPosition", handler!(media::adjust_seek_position)),
    ("Alexa.EqualizerController", "SetMode", handler!(media::set_equalizer_mode)),
    (
        "Alexa.CameraStreamController",
        "InitializeCameraStreams",
        handler!(media::initialize_camera_streams),
    ),
    ("Alexa.EqualizerController", "AdjustBands", handler!(media::bands)),
    ("Alexa.EqualizerController", "ResetBands", handler!(media::bands)),
    ("Alexa.EqualizerController", "SetBands", handler!(media::bands)),
    ("Alexa.ModeController", "SetMode", handler!(controllers::set_mode)),
    ("Alexa.ModeController", "AdjustMode", handler!(controllers::adjust_mode)),
    ("Alexa.ToggleController", "TurnOn", handler!(controllers::toggle_on)),
    ("Alexa.ToggleController", "TurnOff", handler!(controllers::toggle_off)),
    ("Alexa.RangeController", "SetRangeValue", handler!(controllers::set_range)),
    ("Alexa.RangeController", "AdjustRangeValue", handler!(controllers::adjust_range)),
    ("Alexa.PercentageController", "SetPercentage", handler!(controllers::set_percentage)),
    ("Alexa.PercentageController", "AdjustPercentage", handler!(controllers::adjust_percentage)),
    ("Alexa.PowerLevelController", "SetPowerLevel", handler!(controllers::set_power_level)),
    (
        "Alexa.PowerLevelController",
        "AdjustPowerLevel",
        handler!(controllers::adjust_power_level),
    ),
];

/// Handler registered for a directive, if any
pub fn lookup(namespace: &str, name: &str) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(ns, n, _)| *ns == namespace && *n == name)
        .map(|(_, _, handler)| *handler)
}

/// Every registered (namespace, name) pair
pub fn registered() -> impl Iterator<Item = (&'static str, &'static str)> {
    HANDLERS.iter().map(|(ns, n, _)| (*ns, *n))
}

/// Service data targeting one entity
fn target(entity: &Entity) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("entity_id".into(), json!(entity.entity_id));
    data
}

/// Fire-and-forget backend call tagged with the request context
async fn call(
    config: &SmartHomeConfig,
    context: &RequestContext,
    domain: &str,
    service: &str,
    data: Map<String, Value>,
) -> HandlerResult<()> {
    let call = ServiceCall::new(domain, service, data).with_context(context.id.clone());
    config.backend().call_service(call, false).await?;
    Ok(())
}

/// Backend call that waits for the backend's verdict
async fn call_blocking(
    config: &SmartHomeConfig,
    context: &RequestContext,
    domain: &str,
    service: &str,
    data: Map<String, Value>,
) -> HandlerResult<bool> {
    let call = ServiceCall::new(domain, service, data).with_context(context.id.clone());
    Ok(config.backend().call_service(call, true).await?)
}

fn not_supported() -> AlexaError {
    AlexaError::InvalidDirective(DIRECTIVE_NOT_SUPPORTED.to_string())
}

/// Relative change from the payload, saturated into `[-bound, bound]`.
///
/// Callers clamp the result onto a scale no wider than `bound`, so a larger
/// delta lands on the same end of the scale.
fn payload_delta(directive: &Directive, key: &str, bound: i64) -> HandlerResult<i64> {
    let bound = bound as f64;
    Ok(directive.payload_f64(key)?.clamp(-bound, bound) as i64)
}

/// Signed repeat count as (backwards, calls)
fn repeat_count(directive: &Directive, key: &str) -> HandlerResult<(bool, u64)> {
    let count = directive.payload_f64(key)?.trunc();
    if count.abs() > MAX_REPEATED_CALLS as f64 {
        return Err(AlexaError::InvalidValue(format!(
            "{} {} exceeds {}",
            key, count, MAX_REPEATED_CALLS
        )));
    }
    Ok((count < 0.0, count.abs() as u64))
}

/// Numeric attribute the handler cannot work without
fn required_attr(entity: &Entity, attribute: &str) -> HandlerResult<f64> {
    entity.attr_f64(attribute).ok_or_else(|| {
        AlexaError::InvalidValue(format!(
            "Unable to determine {} of {}",
            attribute, entity.entity_id
        ))
    })
}

#[cfg(test)]
mod tests;
