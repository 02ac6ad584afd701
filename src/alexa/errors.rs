//! Typed Alexa failures.
//!
//! Handlers return these; the orchestrator is the only place that turns
//! them into ErrorResponse events.

use crate::alexa::consts::TempUnit;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Errors reported back to Alexa as an ErrorResponse
#[derive(Error, Debug)]
pub enum AlexaError {
    /// Endpoint ID not found or not exposed
    #[error("{0}")]
    InvalidEndpoint(String),

    /// Payload value not understood for this entity
    #[error("{0}")]
    InvalidValue(String),

    /// Directive recognized but not supported for this entity or locale
    #[error("{0}")]
    InvalidDirective(String),

    /// Requested temperature outside the entity's min/max
    #[error("Requested temperature {temperature} is out of range")]
    TempRange {
        temperature: f64,
        min: f64,
        max: f64,
        unit: TempUnit,
    },

    #[error("{0}")]
    UnsupportedThermostatMode(String),

    #[error("{0}")]
    UnsupportedThermostatTargetState(String),

    /// Arm attempted while the panel is not disarmed
    #[error("{0}")]
    SecurityPanelAuthorizationRequired(String),

    /// Disarm refused by the backend
    #[error("{0}")]
    SecurityPanelUnauthorized(String),

    /// Seek requested without a current media position
    #[error("{0}")]
    VideoActionNotPermittedForContent(String),

    /// Integration disabled
    #[error("{0}")]
    BridgeUnreachable(String),

    /// Untyped failure; reported as INTERNAL_ERROR without details
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AlexaError {
    /// Interface the error type is scoped to
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::UnsupportedThermostatMode(_) | Self::UnsupportedThermostatTargetState(_) => {
                "Alexa.ThermostatController"
            }
            Self::SecurityPanelAuthorizationRequired(_) | Self::SecurityPanelUnauthorized(_) => {
                "Alexa.SecurityPanelController"
            }
            Self::VideoActionNotPermittedForContent(_) => "Alexa.Video",
            _ => "Alexa",
        }
    }

    /// Value of the payload `type` field
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint(_) => "NO_SUCH_ENDPOINT",
            Self::InvalidValue(_) => "INVALID_VALUE",
            Self::InvalidDirective(_) => "INVALID_DIRECTIVE",
            Self::TempRange { .. } => "TEMPERATURE_VALUE_OUT_OF_RANGE",
            Self::UnsupportedThermostatMode(_) => "UNSUPPORTED_THERMOSTAT_MODE",
            Self::UnsupportedThermostatTargetState(_) => "INVALID_TARGET_STATE",
            Self::SecurityPanelAuthorizationRequired(_) => "AUTHORIZATION_REQUIRED",
            Self::SecurityPanelUnauthorized(_) => "UNAUTHORIZED",
            Self::VideoActionNotPermittedForContent(_) => "ACTION_NOT_PERMITTED_FOR_CONTENT",
            Self::BridgeUnreachable(_) => "BRIDGE_UNREACHABLE",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Extra payload fields beyond `type` and `message`
    pub fn payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Self::TempRange { min, max, unit, .. } = self {
            payload.insert(
                "validRange".into(),
                json!({
                    "minimumValue": {"value": min, "scale": unit.api_name()},
                    "maximumValue": {"value": max, "scale": unit.api_name()},
                }),
            );
        }
        payload
    }

    /// Message safe to send to Alexa; untyped failures never leak details
    pub fn public_message(&self) -> String {
        match self {
            Self::Other(_) => "Unknown error".to_string(),
            other => other.to_string(),
        }
    }
}

pub type HandlerResult<T> = Result<T, AlexaError>;
