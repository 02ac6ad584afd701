use crate::alexa::capabilities::{Capability, CapabilityError, PropertyResult};
use crate::state::Entity;
use serde_json::{json, Value};
use std::sync::Arc;

/// Color modes that imply dimming support
pub const BRIGHTNESS_MODES: &[&str] = &[
    "brightness",
    "color_temp",
    "hs",
    "xy",
    "rgb",
    "rgbw",
    "rgbww",
    "white",
];

pub const COLOR_MODES: &[&str] = &["hs", "xy", "rgb", "rgbw", "rgbww"];

pub fn supports_any_mode(entity: &Entity, modes: &[&str]) -> bool {
    entity
        .attr_list("supported_color_modes")
        .iter()
        .any(|mode| modes.contains(&mode.as_str()))
}

/// Mireds to kelvin (and back; the conversion is its own inverse)
pub fn mired_to_kelvin(mired: f64) -> f64 {
    if mired <= 0.0 {
        return 0.0;
    }
    (1_000_000.0 / mired).floor()
}

pub struct BrightnessController {
    entity: Arc<Entity>,
}

impl BrightnessController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for BrightnessController {
    fn name(&self) -> &'static str {
        "Alexa.BrightnessController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["brightness"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "brightness" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let brightness = self.entity.attr_f64("brightness").unwrap_or(0.0);
        Ok(Some(json!((brightness / 255.0 * 100.0).round() as i64)))
    }
}

pub struct ColorController {
    entity: Arc<Entity>,
}

impl ColorController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for ColorController {
    fn name(&self) -> &'static str {
        "Alexa.ColorController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["color"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "color" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        let (hue, saturation) = match self.entity.attr("hs_color").and_then(Value::as_array) {
            Some(hs) if hs.len() == 2 => (
                hs[0].as_f64().unwrap_or(0.0),
                hs[1].as_f64().unwrap_or(0.0),
            ),
            _ => (0.0, 0.0),
        };
        let brightness = self.entity.attr_f64("brightness").unwrap_or(0.0);

        Ok(Some(json!({
            "hue": hue,
            "saturation": saturation / 100.0,
            "brightness": brightness / 255.0,
        })))
    }
}

pub struct ColorTemperatureController {
    entity: Arc<Entity>,
}

impl ColorTemperatureController {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }
}

impl Capability for ColorTemperatureController {
    fn name(&self) -> &'static str {
        "Alexa.ColorTemperatureController"
    }

    fn properties_supported(&self) -> &'static [&'static str] {
        &["colorTemperatureInKelvin"]
    }

    fn properties_proactively_reported(&self) -> bool {
        true
    }

    fn properties_retrievable(&self) -> bool {
        true
    }

    fn get_property(&self, name: &str) -> PropertyResult {
        if name != "colorTemperatureInKelvin" {
            return Err(CapabilityError::unsupported(self.name(), name));
        }

        if let Some(kelvin) = self.entity.attr_f64("color_temp_kelvin") {
            return Ok(Some(json!(kelvin as i64)));
        }
        Ok(self
            .entity
            .attr_f64("color_temp")
            .map(|mired| json!(mired_to_kelvin(mired) as i64)))
    }
}
