use super::{call, not_supported, target, RequestContext};
use crate::alexa::capabilities::has_feature;
use crate::alexa::consts::features::{media_player, vacuum};
use crate::alexa::consts::UNLOCK_LOCALES;
use crate::alexa::entities;
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{now_timestamp, Directive, PropertyReport, Response};
use crate::config::SmartHomeConfig;
use crate::state::Entity;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub async fn discover(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    _context: &RequestContext,
) -> HandlerResult<Response> {
    let endpoints = entities::discovery(config).await;
    debug!(count = endpoints.len(), "Discovery complete");

    let mut payload = Map::new();
    payload.insert("endpoints".into(), Value::Array(endpoints));
    Ok(directive.response_with("Discover.Response", "Alexa.Discovery", payload))
}

/// Exchange the grant code and start reporting if the account allows it
pub async fn accept_grant(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    _context: &RequestContext,
) -> HandlerResult<Response> {
    let code = directive
        .payload
        .get("grant")
        .and_then(|grant| grant.get("code"))
        .and_then(Value::as_str)
        .ok_or_else(|| AlexaError::InvalidValue("Missing grant code".into()))?;

    if config.supports_auth() {
        config
            .async_accept_grant(code)
            .await
            .map_err(|e| AlexaError::Other(e.into()))?;

        if config.should_report_state() {
            config.enable_proactive_mode().await;
        }
    } else {
        warn!("AcceptGrant received but no token provider is configured");
    }

    Ok(directive.response_with("AcceptGrant.Response", "Alexa.Authorization", Map::new()))
}

/// Properties are attached by the orchestrator's context merge
pub async fn report_state(
    _config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    _context: &RequestContext,
) -> HandlerResult<Response> {
    Ok(directive.response_with("StateReport", "Alexa", Map::new()))
}

/// Backend domain and service for a power directive
fn power_service(entity: &Entity, on: bool) -> (&str, &'static str) {
    let generic = if on { "turn_on" } else { "turn_off" };

    match entity.domain() {
        "group" => ("homeassistant", generic),
        "cover" => ("cover", if on { "open_cover" } else { "close_cover" }),
        "timer" => ("timer", if on { "start" } else { "cancel" }),
        "vacuum" => {
            let (native, fallback, service) = if on {
                (vacuum::TURN_ON, vacuum::START, "start")
            } else {
                (vacuum::TURN_OFF, vacuum::RETURN_HOME, "return_to_base")
            };
            if !has_feature(entity, native) && has_feature(entity, fallback) {
                ("vacuum", service)
            } else {
                ("vacuum", generic)
            }
        }
        "media_player" => {
            if has_feature(entity, media_player::TURN_ON | media_player::TURN_OFF) {
                ("media_player", generic)
            } else {
                ("media_player", if on { "media_play" } else { "media_stop" })
            }
        }
        domain => (domain, generic),
    }
}

pub async fn turn_on(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let (domain, service) = power_service(entity, true);
    call(config, context, domain, service, target(entity)).await?;
    Ok(directive.response())
}

pub async fn turn_off(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let (domain, service) = power_service(entity, false);
    call(config, context, domain, service, target(entity)).await?;
    Ok(directive.response())
}

fn scene_payload() -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("cause".into(), json!({"type": "VOICE_INTERACTION"}));
    payload.insert("timestamp".into(), json!(now_timestamp()));
    payload
}

pub async fn activate(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let service = match entity.domain() {
        "button" | "input_button" => "press",
        _ => "turn_on",
    };
    call(config, context, entity.domain(), service, target(entity)).await?;

    Ok(directive.response_with("ActivationStarted", "Alexa.SceneController", scene_payload()))
}

pub async fn deactivate(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    call(config, context, entity.domain(), "turn_off", target(entity)).await?;

    Ok(directive.response_with("DeactivationStarted", "Alexa.SceneController", scene_payload()))
}

pub async fn lock(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    call(config, context, entity.domain(), "lock", target(entity)).await?;

    let mut response = directive.response();
    response.add_context_property(PropertyReport::new(
        "Alexa.LockController",
        "lockState",
        json!("LOCKED"),
    ));
    Ok(response)
}

/// Unlock by voice is only offered in some regions
pub async fn unlock(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    if !UNLOCK_LOCALES.contains(&config.locale()) {
        return Err(AlexaError::InvalidDirective(format!(
            "The unlock directive is not supported for the following locales: {}",
            config.locale()
        )));
    }

    let entity = directive.entity()?;
    call(config, context, entity.domain(), "unlock", target(entity)).await?;

    let mut response = directive.response();
    response.add_context_property(PropertyReport::new(
        "Alexa.LockController",
        "lockState",
        json!("UNLOCKED"),
    ));
    Ok(response)
}

pub async fn hold(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let service = match entity.domain() {
        "timer" => "pause",
        "vacuum" => "start_pause",
        _ => return Err(not_supported()),
    };
    call(config, context, entity.domain(), service, target(entity)).await?;
    Ok(directive.response())
}

pub async fn resume(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let service = match entity.domain() {
        "timer" => "start",
        "vacuum" => "start_pause",
        _ => return Err(not_supported()),
    };
    call(config, context, entity.domain(), service, target(entity)).await?;
    Ok(directive.response())
}
