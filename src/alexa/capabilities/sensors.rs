use crate::alexa::capabilities::{Capability, CapabilityError, PropertyResult, STATE_UNKNOWN};
use crate::alexa::consts::LOCALES_US;
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;

fn detection_state(entity: &Entity) -> &'static str {
    if entity.state == "on" {
        "DETECTED"
    } else {
        "NOT_DETECTED"
    }
}

pub struct ContactSensor {
    entity: Arc<Entity>,
}

impl ContactSensor {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for ContactSensor {
    fn name(&self) -> &'static str {
        "Alexa.ContactSensor"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["detectionState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "detectionState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }
        Ok(Some(json!(detection_state(&self.entity))))
    }
}

pub struct MotionSensor {
    entity: Arc<Entity>,
}

impl MotionSensor {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for MotionSensor {
    fn name(&self) -> &'static str {
        "Alexa.MotionSensor"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["detectionState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "detectionState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }
        Ok(Some(json!(detection_state(&self.entity))))
    }
}

/// Human presence detection (presence sensors, buttons)
pub struct EventDetectionSensor {
    entity: Arc<Entity>,
}

impl EventDetectionSensor {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }

    fn is_button(&self) -> bool {
        matches!(self.entity.domain(), "button" | "input_button")
    }
}

impl Capability for EventDetectionSensor {
    fn name(&self) -> &'static str {
        "Alexa.EventDetectionSensor"
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_US
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["humanPresenceDetectionState"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "humanPresenceDetectionState" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let state = self.entity.state.as_str();
        if state == "unavailable" || state == STATE_UNKNOWN {
            return Ok(None);
        }

        // Image processing counts detected faces, plates or objects
        let detected = if self.entity.domain() == "image_processing" {
            let count: f64 = state
                .parse()
                .map_err(|_| CapabilityError::invalid(&self.entity, "state"))?;
            count != 0.0
        } else {
            state == "on" || self.is_button()
        };
        let value = if detected { "DETECTED" } else { "NOT_DETECTED" };
        Ok(Some(json!({ "value": value })))
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        Ok(Some(json!({
            "detectionMethods": ["AUDIO", "VIDEO"],
            "detectionModes": {
                "humanPresence": {
                    "featureAvailability": "ENABLED",
                    "supportsNotDetected": !self.is_button(),
                }
            },
        })))
    }
}
