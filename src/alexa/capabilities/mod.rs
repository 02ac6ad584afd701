//! One type per Alexa interface.
//!
//! Every capability is bound to a single entity snapshot and knows how to
//! describe itself for discovery and how to read its current property
//! values.

mod basic;
mod climate;
mod controllers;
mod lighting;
mod media;
mod sensors;

pub use basic::{
    Alexa, DoorbellEventSource, EndpointHealth, LockController, PowerController, SceneController,
    SecurityPanelController, TimeHoldController,
};
pub use climate::{TemperatureSensor, ThermostatController};
pub use controllers::{
    fan_percentage, fan_speed_tier, ModeController, PercentageController, PowerLevelController,
    RangeController, ToggleController,
};
pub use lighting::{
    mired_to_kelvin, supports_any_mode, BrightnessController, ColorController,
    ColorTemperatureController, BRIGHTNESS_MODES, COLOR_MODES,
};
pub use media::{
    valid_inputs, CameraStreamController, ChannelController, EqualizerController, InputController, PlaybackController,
    PlaybackStateReporter, SeekController, Speaker, StepSpeaker,
};
pub use sensors::{ContactSensor, EventDetectionSensor, MotionSensor};

use crate::alexa::consts::LOCALES_ALL;
use crate::alexa::messages::PropertyReport;
use crate::state::Entity;
use serde_json::{json, Map, Value};
use thiserror::Error;

pub const STATE_UNAVAILABLE: &str = "unavailable";
pub const STATE_UNKNOWN: &str = "unknown";

/// Failure reading a capability property or configuration
#[derive(Error, Debug, PartialEq)]
pub enum CapabilityError {
    #[error("{interface} does not support property {property}")]
    UnsupportedProperty {
        interface: &'static str,
        property: String,
    },

    #[error("{entity_id}: invalid attribute {attribute}")]
    InvalidAttribute { entity_id: String, attribute: String },
}

impl CapabilityError {
    pub fn unsupported(interface: &'static str, property: &str) -> Self {
        Self::UnsupportedProperty {
            interface,
            property: property.to_string(),
        }
    }

    pub fn invalid(entity: &Entity, attribute: &str) -> Self {
        Self::InvalidAttribute {
            entity_id: entity.entity_id.clone(),
            attribute: attribute.to_string(),
        }
    }
}

pub type PropertyResult = Result<Option<Value>, CapabilityError>;

/// An Alexa interface implemented by one entity
pub trait Capability: Send + Sync {
    /// Interface name, e.g. "Alexa.PowerController"
    fn name(&self) -> &'static str;

    /// Instance for Mode/Range/Toggle controllers
    fn instance(&self) -> Option<&str> {
        None
    }

    fn supported_locales(&self) -> &'static [&'static str] {
        LOCALES_ALL
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &[]
    }

    fn properties_proactively_reported(&self) -> bool {
        false
    }

    fn properties_retrievable(&self) -> bool {
        false
    }

    fn properties_non_controllable(&self) -> Option<bool> {
        None
    }

    /// Current value of one supported property; `None` means unknown
    fn get_property(&self, name: &str) -> PropertyResult {
        Err(CapabilityError::unsupported(self.name(), name))
    }

    /// Capability-level `proactivelyReported` (event sources)
    fn capability_proactively_reported(&self) -> Option<bool> {
        None
    }

    /// Emits discrete doorbell presses rather than properties
    fn is_doorbell(&self) -> bool {
        false
    }

    fn supports_deactivation(&self) -> Option<bool> {
        None
    }

    fn capability_resources(&self) -> Option<Value> {
        None
    }

    fn configuration(&self) -> Result<Option<Value>, CapabilityError> {
        Ok(None)
    }

    fn configurations(&self) -> Option<Value> {
        None
    }

    fn semantics(&self) -> Option<Value> {
        None
    }

    fn supported_operations(&self) -> Option<Vec<&'static str>> {
        None
    }

    fn inputs(&self) -> Option<Value> {
        None
    }

    fn camera_stream_configurations(&self) -> Option<Value> {
        None
    }

    /// Discovery description of this interface
    fn serialize_discovery(&self) -> Result<Value, CapabilityError> {
        let mut result = Map::new();
        result.insert("type".into(), json!("AlexaInterface"));
        result.insert("interface".into(), json!(self.name()));
        result.insert("version".into(), json!("3"));

        if let Some(instance) = self.instance() {
            result.insert("instance".into(), json!(instance));
        }

        let supported = self.properties_supported();
        if !supported.is_empty() {
            let names: Vec<Value> = supported.iter().map(|name| json!({ "name": name })).collect();
            let mut properties = json!({
                "supported": names,
                "proactivelyReported": self.properties_proactively_reported(),
                "retrievable": self.properties_retrievable(),
            });
            if let Some(non_controllable) = self.properties_non_controllable() {
                properties["nonControllable"] = json!(non_controllable);
            }
            result.insert("properties".into(), properties);
        }

        if let Some(reported) = self.capability_proactively_reported() {
            result.insert("proactivelyReported".into(), json!(reported));
        }
        if let Some(deactivation) = self.supports_deactivation() {
            result.insert("supportsDeactivation".into(), json!(deactivation));
        }
        if let Some(resources) = self.capability_resources() {
            result.insert("capabilityResources".into(), resources);
        }
        if let Some(configuration) = self.configuration()? {
            result.insert("configuration".into(), configuration);
        }
        if let Some(configurations) = self.configurations() {
            result.insert("configurations".into(), configurations);
        }
        if let Some(semantics) = self.semantics() {
            result.insert("semantics".into(), semantics);
        }
        if let Some(operations) = self.supported_operations() {
            result.insert("supportedOperations".into(), json!(operations));
        }
        if let Some(inputs) = self.inputs() {
            result.insert("inputs".into(), inputs);
        }
        if let Some(streams) = self.camera_stream_configurations() {
            result.insert("cameraStreamConfigurations".into(), streams);
        }

        Ok(Value::Object(result))
    }

    /// Current values of all supported properties that are known
    fn serialize_properties(&self) -> Result<Vec<PropertyReport>, CapabilityError> {
        let mut reports = Vec::new();
        for name in self.properties_supported() {
            if let Some(value) = self.get_property(name)? {
                reports.push(
                    PropertyReport::new(self.name(), name, value).with_instance(self.instance()),
                );
            }
        }
        Ok(reports)
    }
}

/// `supported_features` bitmask; absent means 0
pub fn supported_features(entity: &Entity) -> Result<u64, CapabilityError> {
    match entity.attr("supported_features") {
        None => Ok(0),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| CapabilityError::invalid(entity, "supported_features")),
    }
}

pub(crate) fn has_feature(entity: &Entity, feature: u64) -> bool {
    supported_features(entity).map_or(false, |bits| bits & feature != 0)
}

pub(crate) fn is_unavailable(entity: &Entity) -> bool {
    entity.state == STATE_UNAVAILABLE
}
