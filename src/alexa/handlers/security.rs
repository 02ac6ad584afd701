use super::{call, call_blocking, not_supported, target, RequestContext};
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::messages::{Directive, PropertyReport, Response};
use crate::config::SmartHomeConfig;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const NAMESPACE: &str = "Alexa.SecurityPanelController";
const STATE_DISARMED: &str = "disarmed";

/// Arming is only allowed from the disarmed state
pub async fn arm(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let arm_state = directive.payload_str("armState")?;

    if entity.state != STATE_DISARMED {
        return Err(AlexaError::SecurityPanelAuthorizationRequired(
            "You must disarm the system before you can set the requested arm state.".into(),
        ));
    }

    let service = match arm_state {
        "ARMED_AWAY" => "alarm_arm_away",
        "ARMED_NIGHT" => "alarm_arm_night",
        "ARMED_STAY" => "alarm_arm_home",
        _ => return Err(not_supported()),
    };
    call(config, context, entity.domain(), service, target(entity)).await?;

    // No exit delay is known for backend panels
    let mut payload = Map::new();
    payload.insert("exitDelayInSeconds".into(), json!(0));

    let mut response = directive.response_with("Arm.Response", NAMESPACE, payload);
    response.add_context_property(PropertyReport::new(NAMESPACE, "armState", json!(arm_state)));
    Ok(response)
}

/// Disarm waits for the backend so a rejected PIN can be reported
pub async fn disarm(
    config: &Arc<SmartHomeConfig>,
    directive: &Directive,
    context: &RequestContext,
) -> HandlerResult<Response> {
    let entity = directive.entity()?;
    let mut response = directive.response();

    // Disarming a disarmed panel is a success, not an error
    if entity.state == STATE_DISARMED {
        return Ok(response);
    }

    let mut data = target(entity);
    if let Some(authorization) = directive.payload.get("authorization") {
        let is_pin = authorization.get("type").and_then(Value::as_str) == Some("FOUR_DIGIT_PIN");
        if let (true, Some(code)) = (is_pin, authorization.get("value")) {
            data.insert("code".into(), code.clone());
        }
    }

    if !call_blocking(config, context, entity.domain(), "alarm_disarm", data).await? {
        return Err(AlexaError::SecurityPanelUnauthorized(
            "Invalid code for disarming the security panel".into(),
        ));
    }

    response.add_context_property(PropertyReport::new(NAMESPACE, "armState", json!("DISARMED")));
    Ok(response)
}
