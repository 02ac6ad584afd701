use crate::alexa::capabilities::{
    is_unavailable, supported_features, Capability, CapabilityError, PropertyResult,
    STATE_UNKNOWN,
};
use crate::alexa::consts::features::alarm;
use crate::alexa::consts::{LOCALES_DOORBELL, LOCALES_US};
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;

/// Base interface every discoverable endpoint carries
pub struct Alexa;

impl Capability for Alexa {
    fn name(&self) -> &'static str {
        "Alexa"
    }
}

/// Reachability of the device
pub struct EndpointHealth {
    entity: Arc<Entity>,
}

impl EndpointHealth {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for EndpointHealth {
    fn name(&self) -> &'static str {
        "Alexa.EndpointHealth"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["connectivity"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "connectivity" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let value = if is_unavailable(&self.entity) {
            "UNREACHABLE"
        } else {
            "OK"
        };
        Ok(Some(json!({ "value": value })))
    }
}

pub struct PowerController {
    entity: Arc<Entity>,
}

impl PowerController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for PowerController {
    fn name(&self) -> &'static str {
        "Alexa.PowerController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["powerState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "powerState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let state = self.entity.state.as_str();
        let is_on = match self.entity.domain() {
            "climate" => state != "off",
            "fan" | "humidifier" => state == "on",
            "remote" => state != "off" && state != STATE_UNKNOWN,
            "vacuum" => state == "cleaning",
            "timer" => state != "idle",
            "water_heater" => state != "off" && state != STATE_UNKNOWN,
            _ => state != "off",
        };

        Ok(Some(json!(if is_on { "ON" } else { "OFF" })))
    }
}

pub struct LockController {
    entity: Arc<Entity>,
}

impl LockController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for LockController {
    fn name(&self) -> &'static str {
        "Alexa.LockController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["lockState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "lockState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        // Transitional states report the state being left
        let value = match self.entity.state.as_str() {
            "locked" | "unlocking" => "LOCKED",
            "unlocked" | "locking" => "UNLOCKED",
            _ => "JAMMED",
        };
        Ok(Some(json!(value)))
    }
}

pub struct SceneController {
    supports_deactivation: bool,
}

impl SceneController {
    pub fn new(supports_deactivation: bool) -> Self {
        Self {
            supports_deactivation,
        }
    }
}

impl Capability for SceneController {
    fn name(&self) -> &'static str {
        "Alexa.SceneController"
    }

    fn supports_deactivation(&self) -> Option<bool> {
        Some(self.supports_deactivation)
    }
}

pub struct SecurityPanelController {
    entity: Arc<Entity>,
}

impl SecurityPanelController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for SecurityPanelController {
    fn name(&self) -> &'static str {
        "Alexa.SecurityPanelController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["armState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "armState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let value = match self.entity.state.as_str() {
            "armed_home" | "armed_custom_bypass" => "ARMED_STAY",
            "armed_away" => "ARMED_AWAY",
            "armed_night" => "ARMED_NIGHT",
            _ => "DISARMED",
        };
        Ok(Some(json!(value)))
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        let supported = supported_features(&self.entity)?;

        let mut arm_states = vec![json!({"value": "DISARMED"})];
        if supported & alarm::ARM_AWAY != 0 {
            arm_states.push(json!({"value": "ARMED_AWAY"}));
        }
        if supported & alarm::ARM_HOME != 0 {
            arm_states.push(json!({"value": "ARMED_STAY"}));
        }
        if supported & alarm::ARM_NIGHT != 0 {
            arm_states.push(json!({"value": "ARMED_NIGHT"}));
        }

        let mut configuration = json!({ "supportedArmStates": arm_states });
        if self.entity.attr_str("code_format") == Some("number") {
            configuration["supportedAuthorizationTypes"] = json!([{"type": "FOUR_DIGIT_PIN"}]);
        }

        Ok(Some(configuration))
    }
}

/// Pause/resume of timers and vacuums
pub struct TimeHoldController {
    allow_remote_resume: bool,
}

impl TimeHoldController {
    pub fn new(allow_remote_resume: bool) -> Self {
        Self {
            allow_remote_resume,
        }
    }
}

impl Capability for TimeHoldController {
    fn name(&self) -> &'static str {
        "Alexa.TimeHoldController"
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_US
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        Ok(Some(json!({ "allowRemoteResume": self.allow_remote_resume })))
    }
}

/// Discrete doorbell press events
pub struct DoorbellEventSource;

impl Capability for DoorbellEventSource {
    fn name(&self) -> &'static str {
        "Alexa.DoorbellEventSource"
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_DOORBELL
    }

    fn capability_proactively_reported(&self) -> Option<bool> {
        Some(true)
    }

    fn is_doorbell(&self) -> bool {
        true
    }
}
