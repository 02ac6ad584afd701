//! Capability resources, mode/preset configuration and semantics.
//!
//! Labels that belong to the Alexa global catalog serialize as assets,
//! everything else as en-US text.

use serde_json::{json, Value};

/// Alexa global catalog asset ids
pub mod catalog {
    pub const SETTING_DIRECTION: &str = "Alexa.Setting.Direction";
    pub const SETTING_FAN_SPEED: &str = "Alexa.Setting.FanSpeed";
    pub const SETTING_MODE: &str = "Alexa.Setting.Mode";
    pub const SETTING_OPENING: &str = "Alexa.Setting.Opening";
    pub const SETTING_OSCILLATE: &str = "Alexa.Setting.Oscillate";
    pub const SETTING_PRESET: &str = "Alexa.Setting.Preset";
    pub const SETTING_TEMPERATURE: &str = "Alexa.Setting.Temperature";
    pub const UNIT_PERCENT: &str = "Alexa.Unit.Percent";
    pub const UNIT_TEMPERATURE_CELSIUS: &str = "Alexa.Unit.Temperature.Celsius";
    pub const UNIT_TEMPERATURE_FAHRENHEIT: &str = "Alexa.Unit.Temperature.Fahrenheit";
    pub const VALUE_CLOSE: &str = "Alexa.Value.Close";
    pub const VALUE_MAXIMUM: &str = "Alexa.Value.Maximum";
    pub const VALUE_MINIMUM: &str = "Alexa.Value.Minimum";
    pub const VALUE_OPEN: &str = "Alexa.Value.Open";

    pub const ALL: &[&str] = &[
        SETTING_DIRECTION,
        SETTING_FAN_SPEED,
        SETTING_MODE,
        SETTING_OPENING,
        SETTING_OSCILLATE,
        SETTING_PRESET,
        SETTING_TEMPERATURE,
        UNIT_PERCENT,
        UNIT_TEMPERATURE_CELSIUS,
        UNIT_TEMPERATURE_FAHRENHEIT,
        VALUE_CLOSE,
        VALUE_MAXIMUM,
        VALUE_MINIMUM,
        VALUE_OPEN,
    ];

    pub fn contains(label: &str) -> bool {
        ALL.contains(&label)
    }
}

/// Friendly-name list for capability, mode and preset resources
pub fn serialize_labels<S: AsRef<str>>(labels: &[S]) -> Value {
    let labels: Vec<Value> = labels
        .iter()
        .map(|label| {
            let label = label.as_ref();
            if catalog::contains(label) {
                json!({"@type": "asset", "value": {"assetId": label}})
            } else {
                json!({"@type": "text", "value": {"text": label, "locale": "en-US"}})
            }
        })
        .collect();
    Value::Array(labels)
}

fn capability_resources(labels: &[String]) -> Value {
    json!({"friendlyNames": serialize_labels(labels)})
}

/// ModeController resource: a named, optionally ordered set of modes
#[derive(Clone, Debug)]
pub struct ModeResource {
    labels: Vec<String>,
    ordered: bool,
    modes: Vec<(String, Vec<String>)>,
}

impl ModeResource {
    pub fn new(labels: &[&str], ordered: bool) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            ordered,
            modes: Vec::new(),
        }
    }

    pub fn add_mode(&mut self, value: impl Into<String>, labels: &[&str]) {
        self.modes
            .push((value.into(), labels.iter().map(|l| l.to_string()).collect()));
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    pub fn serialize_capability_resources(&self) -> Value {
        capability_resources(&self.labels)
    }

    pub fn serialize_configuration(&self) -> Value {
        let supported: Vec<Value> = self
            .modes
            .iter()
            .map(|(value, labels)| {
                json!({
                    "value": value,
                    "modeResources": {"friendlyNames": serialize_labels(labels)},
                })
            })
            .collect();

        json!({"ordered": self.ordered, "supportedModes": supported})
    }
}

/// RangeController resource: numeric range with optional named presets
#[derive(Clone, Debug)]
pub struct PresetResource {
    labels: Vec<String>,
    min: f64,
    max: f64,
    precision: f64,
    unit: Option<&'static str>,
    presets: Vec<(f64, Vec<String>)>,
}

impl PresetResource {
    pub fn new(labels: &[&str], min: f64, max: f64, precision: f64) -> Self {
        Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            min,
            max,
            precision,
            unit: None,
            presets: Vec::new(),
        }
    }

    /// Only catalog units are serialized
    pub fn with_unit(mut self, unit: Option<&str>) -> Self {
        self.unit = unit.and_then(|u| catalog::ALL.iter().copied().find(|c| *c == u));
        self
    }

    pub fn add_preset(&mut self, value: f64, labels: Vec<String>) {
        self.presets.push((value, labels));
    }

    pub fn serialize_capability_resources(&self) -> Value {
        capability_resources(&self.labels)
    }

    pub fn serialize_configuration(&self) -> Value {
        let mut configuration = json!({
            "supportedRange": {
                "minimumValue": number(self.min),
                "maximumValue": number(self.max),
                "precision": number(self.precision),
            }
        });

        if let Some(unit) = self.unit {
            configuration["unitOfMeasure"] = json!(unit);
        }

        if !self.presets.is_empty() {
            let presets: Vec<Value> = self
                .presets
                .iter()
                .map(|(value, labels)| {
                    json!({
                        "rangeValue": number(*value),
                        "presetResources": {"friendlyNames": serialize_labels(labels)},
                    })
                })
                .collect();
            configuration["presets"] = Value::Array(presets);
        }

        configuration
    }
}

/// Integral floats serialize as integers
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Semantic action/state mappings (e.g. "open the blinds")
#[derive(Clone, Debug, Default)]
pub struct Semantics {
    actions: Vec<Value>,
    states: Vec<Value>,
}

impl Semantics {
    pub const ACTION_CLOSE: &'static str = "Alexa.Actions.Close";
    pub const ACTION_OPEN: &'static str = "Alexa.Actions.Open";
    pub const ACTION_LOWER: &'static str = "Alexa.Actions.Lower";
    pub const ACTION_RAISE: &'static str = "Alexa.Actions.Raise";
    pub const STATES_OPEN: &'static str = "Alexa.States.Open";
    pub const STATES_CLOSED: &'static str = "Alexa.States.Closed";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_states_to_value(&mut self, states: &[&str], value: Value) {
        self.states.push(json!({
            "@type": "StatesToValue",
            "states": states,
            "value": value,
        }));
    }

    pub fn add_states_to_range(&mut self, states: &[&str], min: i64, max: i64) {
        self.states.push(json!({
            "@type": "StatesToRange",
            "states": states,
            "range": {"minimumValue": min, "maximumValue": max},
        }));
    }

    pub fn add_action_to_directive(&mut self, actions: &[&str], directive: &str, payload: Value) {
        self.actions.push(json!({
            "@type": "ActionsToDirective",
            "actions": actions,
            "directive": {"name": directive, "payload": payload},
        }));
    }

    pub fn serialize(&self) -> Value {
        let mut semantics = serde_json::Map::new();
        if !self.actions.is_empty() {
            semantics.insert("actionMappings".into(), Value::Array(self.actions.clone()));
        }
        if !self.states.is_empty() {
            semantics.insert("stateMappings".into(), Value::Array(self.states.clone()));
        }
        Value::Object(semantics)
    }
}
