//! Entity adapters: how a backend entity presents itself to Alexa.
//!
//! An adapter is built on demand from a live entity snapshot and the
//! account settings. It decides the endpoint id, naming, display categories
//! and the ordered list of capabilities the entity exposes.

use crate::alexa::capabilities::{
    supported_features, supports_any_mode, valid_inputs, Alexa, BrightnessController,
    CameraStreamController, Capability, CapabilityError, ChannelController, ColorController,
    ColorTemperatureController, ContactSensor, DoorbellEventSource, EndpointHealth,
    EqualizerController, EventDetectionSensor, InputController, LockController, ModeController,
    MotionSensor, PercentageController, PlaybackController, PlaybackStateReporter,
    PowerController, PowerLevelController, RangeController, SceneController,
    SecurityPanelController, SeekController, Speaker, StepSpeaker, TemperatureSensor,
    ThermostatController, TimeHoldController, ToggleController, BRIGHTNESS_MODES, COLOR_MODES,
};
use crate::alexa::consts::display_category as category;
use crate::alexa::consts::features::{
    camera, climate, cover, fan, humidifier, media_player, remote, vacuum, valve, water_heater,
};
use crate::alexa::consts::{TempUnit, MANUFACTURER};
use crate::alexa::messages::PropertyReport;
use crate::config::{SmartHomeConfig, SmartHomeSettings};
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Characters Alexa rejects in ids, names and descriptions
const FORBIDDEN_CHARS: &[char] = &[
    '}', '{', '\\', '/', '|', '"', '(', ')', '[', ']', '+', '~', '!', '>', '<', '*', '%',
];

fn sanitize(text: &str) -> String {
    text.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}

/// Alexa endpoint id for an entity id.
///
/// Entity ids never contain `#` or forbidden characters, so the mapping is
/// injective and [`recover_entity_id`] inverts it.
pub fn to_alexa_id(entity_id: &str) -> String {
    sanitize(&entity_id.replace('.', "#"))
}

pub fn recover_entity_id(alexa_id: &str) -> String {
    alexa_id.replace('#', ".")
}

/// Adapter family, one per supported backend domain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// alert, automation, group
    Generic,
    /// switch, input_boolean
    Switch,
    /// button, input_button
    Button,
    Camera,
    /// climate, water_heater
    Climate,
    Cover,
    Event,
    Light,
    Fan,
    Humidifier,
    /// image_processing
    ImageProcessing,
    Lock,
    MediaPlayer,
    Remote,
    Scene,
    Script,
    Sensor,
    BinarySensor,
    AlarmControlPanel,
    /// input_number, number
    InputNumber,
    Timer,
    Vacuum,
    Valve,
}

impl EntityKind {
    pub fn from_domain(domain: &str) -> Option<Self> {
        let kind = match domain {
            "alert" | "automation" | "group" => Self::Generic,
            "switch" | "input_boolean" => Self::Switch,
            "button" | "input_button" => Self::Button,
            "camera" => Self::Camera,
            "climate" | "water_heater" => Self::Climate,
            "cover" => Self::Cover,
            "event" => Self::Event,
            "light" => Self::Light,
            "fan" => Self::Fan,
            "humidifier" => Self::Humidifier,
            "image_processing" => Self::ImageProcessing,
            "lock" => Self::Lock,
            "media_player" => Self::MediaPlayer,
            "remote" => Self::Remote,
            "scene" => Self::Scene,
            "script" => Self::Script,
            "sensor" => Self::Sensor,
            "binary_sensor" => Self::BinarySensor,
            "alarm_control_panel" => Self::AlarmControlPanel,
            "input_number" | "number" => Self::InputNumber,
            "timer" => Self::Timer,
            "vacuum" => Self::Vacuum,
            "valve" => Self::Valve,
            _ => return None,
        };
        Some(kind)
    }
}

/// Binary sensor flavour derived from its device class
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SensorType {
    Contact,
    Motion,
    Presence,
}

fn binary_sensor_type(entity: &Entity) -> Option<SensorType> {
    match entity.attr_str("device_class")? {
        "door" | "garage_door" | "opening" | "window" => Some(SensorType::Contact),
        "motion" => Some(SensorType::Motion),
        "presence" => Some(SensorType::Presence),
        _ => None,
    }
}

/// One entity expressed in Alexa terms
#[derive(Clone, Debug)]
pub struct EntityAdapter {
    settings: Arc<SmartHomeSettings>,
    entity: Arc<Entity>,
    kind: EntityKind,
}

impl EntityAdapter {
    /// `None` when the entity's domain has no adapter
    pub fn new(settings: Arc<SmartHomeSettings>, entity: Entity) -> Option<Self> {
        let kind = EntityKind::from_domain(entity.domain())?;
        Some(Self {
            settings,
            entity: Arc::new(entity),
            kind,
        })
    }

    pub fn entity_id(&self) -> &str {
        &self.entity.entity_id
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    pub fn alexa_id(&self) -> String {
        to_alexa_id(self.entity_id())
    }

    pub fn friendly_name(&self) -> String {
        let name = self
            .settings
            .entity_override(self.entity_id())
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| self.entity.name());
        sanitize(&name)
    }

    pub fn description(&self) -> String {
        let description = self
            .settings
            .entity_override(self.entity_id())
            .and_then(|o| o.description.clone())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.entity_id().to_string());

        let mut description = sanitize(&format!("{} via {}", description, MANUFACTURER));
        // Scenes are told apart from devices with the same name
        if self.kind == EntityKind::Scene && !description.to_lowercase().contains("scene") {
            description.push_str(" (Scene)");
        }
        description
    }

    /// Configured override, else the kind's default
    pub fn display_categories(&self) -> Vec<String> {
        let category = self
            .configured_category()
            .unwrap_or_else(|| self.default_display_category());
        vec![category.to_string()]
    }

    fn configured_category(&self) -> Option<&str> {
        self.settings
            .entity_override(self.entity_id())
            .and_then(|o| o.display_categories.as_deref())
    }

    fn default_display_category(&self) -> &'static str {
        let entity = &self.entity;
        let device_class = entity.attr_str("device_class");

        match self.kind {
            EntityKind::Generic => {
                if entity.domain() == "automation" {
                    category::ACTIVITY_TRIGGER
                } else {
                    category::OTHER
                }
            }
            EntityKind::Switch => match (entity.domain(), device_class) {
                ("input_boolean", _) => category::OTHER,
                (_, Some("outlet")) => category::SMARTPLUG,
                _ => category::SWITCH,
            },
            EntityKind::Button | EntityKind::Script => category::ACTIVITY_TRIGGER,
            EntityKind::Camera | EntityKind::ImageProcessing => category::CAMERA,
            EntityKind::Climate => {
                if entity.domain() == "water_heater" {
                    category::WATER_HEATER
                } else {
                    category::THERMOSTAT
                }
            }
            EntityKind::Cover => match device_class {
                Some("garage" | "gate") => category::GARAGE_DOOR,
                Some("door") => category::DOOR,
                Some("blind" | "shade" | "curtain") => category::INTERIOR_BLIND,
                Some("window" | "awning" | "shutter") => category::EXTERIOR_BLIND,
                _ => category::OTHER,
            },
            EntityKind::Event => {
                if device_class == Some("doorbell") {
                    category::DOORBELL
                } else {
                    category::OTHER
                }
            }
            EntityKind::Light => category::LIGHT,
            EntityKind::Fan => category::FAN,
            EntityKind::Humidifier | EntityKind::Valve => category::OTHER,
            EntityKind::Remote => category::REMOTE,
            EntityKind::Lock => category::SMARTLOCK,
            EntityKind::MediaPlayer => {
                if device_class == Some("speaker") {
                    category::SPEAKER
                } else {
                    category::TV
                }
            }
            EntityKind::Scene => category::SCENE_TRIGGER,
            EntityKind::Sensor => category::TEMPERATURE_SENSOR,
            EntityKind::BinarySensor => match binary_sensor_type(entity) {
                Some(SensorType::Contact) => category::CONTACT_SENSOR,
                Some(SensorType::Motion) => category::MOTION_SENSOR,
                Some(SensorType::Presence) => category::CAMERA,
                None => category::OTHER,
            },
            EntityKind::AlarmControlPanel => category::SECURITY_PANEL,
            EntityKind::InputNumber | EntityKind::Timer => category::OTHER,
            EntityKind::Vacuum => category::VACUUM_CLEANER,
        }
    }

    fn temperature_unit(&self) -> TempUnit {
        self.settings.temperature_unit
    }

    /// Capabilities in discovery order; empty means "do not expose"
    pub fn interfaces(&self) -> Result<Vec<Box<dyn Capability>>, CapabilityError> {
        let entity = &self.entity;
        let features = supported_features(entity)?;
        let has = |bits: u64| features & bits != 0;
        let power = || -> Box<dyn Capability> { Box::new(PowerController::new(entity.clone())) };
        let health = || -> Box<dyn Capability> { Box::new(EndpointHealth::new(entity.clone())) };

        let mut interfaces: Vec<Box<dyn Capability>> = Vec::new();

        match self.kind {
            EntityKind::Generic | EntityKind::Switch => {
                interfaces.push(power());
                interfaces.push(health());
            }
            EntityKind::Button => {
                interfaces.push(Box::new(SceneController::new(false)));
                interfaces.push(Box::new(EventDetectionSensor::new(entity.clone())));
                interfaces.push(health());
            }
            EntityKind::Camera => {
                if has(camera::STREAM) {
                    if self.settings.stream_base_url().is_some() {
                        interfaces.push(Box::new(CameraStreamController));
                    } else {
                        debug!(
                            entity_id = %self.entity_id(),
                            "Camera streaming requires an HTTPS external_url"
                        );
                    }
                }
                interfaces.push(health());
            }
            EntityKind::Climate => {
                let is_water_heater = entity.domain() == "water_heater";
                let powerable = if is_water_heater {
                    has(water_heater::ON_OFF)
                } else {
                    entity.attr_list("hvac_modes").iter().any(|m| m == "off")
                        || has(climate::TURN_ON | climate::TURN_OFF)
                };
                if powerable {
                    interfaces.push(power());
                }

                if !is_water_heater || has(water_heater::OPERATION_MODE) {
                    let unit = self.temperature_unit();
                    interfaces.push(Box::new(ThermostatController::new(entity.clone(), unit)));
                    interfaces.push(Box::new(TemperatureSensor::new(entity.clone(), unit)));
                }
                if is_water_heater && has(water_heater::OPERATION_MODE) {
                    interfaces.push(Box::new(ModeController::new(
                        entity.clone(),
                        "water_heater.operation_mode",
                    )));
                }
                interfaces.push(health());
            }
            EntityKind::Cover => {
                let device_class = entity.attr_str("device_class");
                if !matches!(device_class, Some("garage" | "gate")) {
                    interfaces.push(power());
                }
                if has(cover::SET_POSITION) {
                    let position = RangeController::new(entity.clone(), "cover.position");
                    interfaces.push(Box::new(position));
                } else if has(cover::OPEN | cover::CLOSE) {
                    let position = ModeController::new(entity.clone(), "cover.position");
                    interfaces.push(Box::new(position));
                }
                if has(cover::SET_TILT_POSITION) {
                    let tilt = RangeController::new(entity.clone(), "cover.tilt");
                    interfaces.push(Box::new(tilt));
                }
                interfaces.push(health());
            }
            EntityKind::Event => {
                if entity.attr_str("device_class") == Some("doorbell") {
                    interfaces.push(Box::new(DoorbellEventSource));
                }
                interfaces.push(health());
            }
            EntityKind::Light => {
                interfaces.push(power());
                if supports_any_mode(entity, BRIGHTNESS_MODES) {
                    interfaces.push(Box::new(BrightnessController::new(entity.clone())));
                }
                if supports_any_mode(entity, COLOR_MODES) {
                    interfaces.push(Box::new(ColorController::new(entity.clone())));
                }
                if supports_any_mode(entity, &["color_temp"]) {
                    interfaces.push(Box::new(ColorTemperatureController::new(entity.clone())));
                }
                interfaces.push(health());
            }
            EntityKind::Fan => {
                interfaces.push(power());
                if has(fan::OSCILLATE) {
                    let oscillating = ToggleController::new(entity.clone(), "fan.oscillating");
                    interfaces.push(Box::new(oscillating));
                }
                if has(fan::PRESET_MODE) {
                    let preset = ModeController::new(entity.clone(), "fan.preset_mode");
                    interfaces.push(Box::new(preset));
                }
                if has(fan::DIRECTION) {
                    let direction = ModeController::new(entity.clone(), "fan.direction");
                    interfaces.push(Box::new(direction));
                }
                if has(fan::SET_SPEED) {
                    interfaces.push(Box::new(PercentageController::new(entity.clone())));
                    interfaces.push(Box::new(PowerLevelController::new(entity.clone())));
                    interfaces.push(Box::new(RangeController::new(entity.clone(), "fan.speed")));
                }
                interfaces.push(health());
            }
            EntityKind::Humidifier => {
                interfaces.push(power());
                if has(humidifier::MODES) {
                    let mode = ModeController::new(entity.clone(), "humidifier.mode");
                    interfaces.push(Box::new(mode));
                }
                let humidity = RangeController::new(entity.clone(), "humidifier.humidity");
                interfaces.push(Box::new(humidity));
                interfaces.push(health());
            }
            EntityKind::ImageProcessing => {
                interfaces.push(Box::new(EventDetectionSensor::new(entity.clone())));
                interfaces.push(health());
            }
            EntityKind::Lock => {
                interfaces.push(Box::new(LockController::new(entity.clone())));
                interfaces.push(health());
            }
            EntityKind::MediaPlayer => {
                interfaces.push(power());
                if has(media_player::VOLUME_SET) {
                    interfaces.push(Box::new(Speaker::new(entity.clone())));
                } else if has(media_player::VOLUME_STEP) {
                    interfaces.push(Box::new(StepSpeaker));
                }

                let playback = media_player::PLAY
                    | media_player::PAUSE
                    | media_player::STOP
                    | media_player::NEXT_TRACK
                    | media_player::PREVIOUS_TRACK;
                if has(playback) {
                    interfaces.push(Box::new(PlaybackController::new(entity.clone())));
                    interfaces.push(Box::new(PlaybackStateReporter::new(entity.clone())));
                }
                if has(media_player::SEEK) {
                    interfaces.push(Box::new(SeekController));
                }
                if has(media_player::SELECT_SOURCE)
                    && !valid_inputs(&entity.attr_list("source_list")).is_empty()
                {
                    interfaces.push(Box::new(InputController::new(entity.clone())));
                }
                if has(media_player::PLAY_MEDIA) {
                    interfaces.push(Box::new(ChannelController));
                }
                if has(media_player::SELECT_SOUND_MODE)
                    && !EqualizerController::valid_modes(&entity.attr_list("sound_mode_list"))
                        .is_empty()
                {
                    interfaces.push(Box::new(EqualizerController::new(entity.clone())));
                }
                interfaces.push(health());
            }
            EntityKind::Remote => {
                interfaces.push(power());
                if has(remote::ACTIVITY) && !entity.attr_list("activity_list").is_empty() {
                    let activity = ModeController::new(entity.clone(), "remote.activity");
                    interfaces.push(Box::new(activity));
                }
                interfaces.push(health());
            }
            EntityKind::Scene => {
                interfaces.push(Box::new(SceneController::new(false)));
            }
            EntityKind::Script => {
                interfaces.push(Box::new(SceneController::new(true)));
            }
            EntityKind::Sensor => {
                // Only temperature sensors are exposed
                let unit = entity.attr_str("unit_of_measurement");
                if !matches!(unit, Some("°C" | "°F")) {
                    return Ok(Vec::new());
                }
                interfaces.push(Box::new(TemperatureSensor::new(
                    entity.clone(),
                    self.temperature_unit(),
                )));
                interfaces.push(health());
            }
            EntityKind::BinarySensor => {
                match binary_sensor_type(entity) {
                    Some(SensorType::Contact) => {
                        interfaces.push(Box::new(ContactSensor::new(entity.clone())))
                    }
                    Some(SensorType::Motion) => {
                        interfaces.push(Box::new(MotionSensor::new(entity.clone())))
                    }
                    Some(SensorType::Presence) => {
                        interfaces.push(Box::new(EventDetectionSensor::new(entity.clone())))
                    }
                    None => {}
                }

                // A configured category adds the matching interface
                match self.configured_category() {
                    Some(category::DOORBELL) => interfaces.push(Box::new(DoorbellEventSource)),
                    Some(category::CONTACT_SENSOR) => {
                        interfaces.push(Box::new(ContactSensor::new(entity.clone())))
                    }
                    Some(category::MOTION_SENSOR) => {
                        interfaces.push(Box::new(MotionSensor::new(entity.clone())))
                    }
                    Some(category::CAMERA) => {
                        interfaces.push(Box::new(EventDetectionSensor::new(entity.clone())))
                    }
                    _ => {}
                }
                interfaces.push(health());
            }
            EntityKind::AlarmControlPanel => {
                // Panels that need a code to arm cannot be armed by voice
                if entity.attr_bool("code_arm_required").unwrap_or(false) {
                    return Ok(Vec::new());
                }
                interfaces.push(Box::new(SecurityPanelController::new(entity.clone())));
                interfaces.push(health());
            }
            EntityKind::InputNumber => {
                let instance = format!("{}.value", entity.domain());
                interfaces.push(Box::new(RangeController::new(entity.clone(), instance)));
                interfaces.push(health());
            }
            EntityKind::Timer => {
                interfaces.push(Box::new(TimeHoldController::new(true)));
                interfaces.push(power());
            }
            EntityKind::Vacuum => {
                if has(vacuum::TURN_ON | vacuum::START)
                    && has(vacuum::TURN_OFF | vacuum::RETURN_HOME)
                {
                    interfaces.push(power());
                }
                if has(vacuum::FAN_SPEED) {
                    let fan_speed = RangeController::new(entity.clone(), "vacuum.fan_speed");
                    interfaces.push(Box::new(fan_speed));
                }
                if has(vacuum::PAUSE) {
                    interfaces.push(Box::new(TimeHoldController::new(has(vacuum::START))));
                }
                interfaces.push(health());
            }
            EntityKind::Valve => {
                if has(valve::SET_POSITION) {
                    let position = RangeController::new(entity.clone(), "valve.position");
                    interfaces.push(Box::new(position));
                } else if has(valve::OPEN | valve::CLOSE) {
                    let state = ModeController::new(entity.clone(), "valve.state");
                    interfaces.push(Box::new(state));
                }
                if has(valve::STOP) {
                    let stop = ToggleController::new(entity.clone(), "valve.stop");
                    interfaces.push(Box::new(stop));
                }
                interfaces.push(health());
            }
        }

        interfaces.push(Box::new(Alexa));
        Ok(interfaces)
    }

    /// Discovery endpoint object; failing capabilities are left out
    pub fn serialize_discovery(&self) -> Result<Value, CapabilityError> {
        let locale = self.settings.locale.as_str();
        let mut capabilities = Vec::new();

        for interface in self.interfaces()? {
            if !interface.supported_locales().contains(&locale) {
                continue;
            }
            match interface.serialize_discovery() {
                Ok(capability) => capabilities.push(capability),
                Err(e) => error!(
                    entity_id = %self.entity_id(),
                    interface = interface.name(),
                    error = %e,
                    "Error serializing discovery"
                ),
            }
        }

        Ok(json!({
            "displayCategories": self.display_categories(),
            "cookie": {},
            "endpointId": self.alexa_id(),
            "friendlyName": self.friendly_name(),
            "description": self.description(),
            "manufacturerName": MANUFACTURER,
            "additionalAttributes": {
                "manufacturer": MANUFACTURER,
                "model": self.entity.domain(),
                "softwareVersion": env!("CARGO_PKG_VERSION"),
                "customIdentifier":
                    format!("{}-{}", self.settings.user_identifier, self.entity_id()),
            },
            "capabilities": capabilities,
        }))
    }

    /// Current values of every proactively reported property.
    ///
    /// A capability that fails to read is skipped; the rest still report.
    pub fn serialize_properties(&self) -> Vec<PropertyReport> {
        let interfaces = match self.interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(entity_id = %self.entity_id(), error = %e, "Cannot read properties");
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        for interface in interfaces
            .iter()
            .filter(|i| i.properties_proactively_reported())
        {
            match interface.serialize_properties() {
                Ok(properties) => reports.extend(properties),
                Err(e) => warn!(
                    entity_id = %self.entity_id(),
                    interface = interface.name(),
                    error = %e,
                    "Property read failed"
                ),
            }
        }
        reports
    }
}

/// Adapters for every exposed entity that has at least one capability
pub async fn exposed_entities(config: &SmartHomeConfig) -> Vec<EntityAdapter> {
    let settings = config.settings();
    let mut adapters = Vec::new();

    for entity in config.backend().list_entities().await {
        if !config.should_expose(&entity.entity_id) {
            continue;
        }

        let entity_id = entity.entity_id.clone();
        let Some(adapter) = EntityAdapter::new(Arc::clone(&settings), entity) else {
            debug!(entity_id = %entity_id, "No adapter for domain");
            continue;
        };

        match adapter.interfaces() {
            Ok(interfaces) if interfaces.is_empty() => continue,
            Ok(_) => adapters.push(adapter),
            Err(e) => {
                error!(entity_id = %entity_id, error = %e, "Unable to serialize for discovery")
            }
        }
    }

    adapters
}

/// Discovery endpoints for the whole account
pub async fn discovery(config: &SmartHomeConfig) -> Vec<Value> {
    exposed_entities(config)
        .await
        .iter()
        .filter_map(|adapter| match adapter.serialize_discovery() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                error!(
                    entity_id = %adapter.entity_id(),
                    error = %e,
                    "Unable to serialize for discovery"
                );
                None
            }
        })
        .collect()
}
