use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Snapshot of one backend entity (e.g. "light.kitchen")
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Namespaced identifier: "<domain>.<object_id>"
    pub entity_id: String,

    /// Current state string ("on", "off", "locked", "unavailable", ...)
    pub state: String,

    /// Typed attributes reported by the backend
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// Last update timestamp
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    /// Build an entity snapshot; non-object attribute values are ignored
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>, attributes: Value) -> Self {
        let attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes,
            last_updated: Utc::now(),
        }
    }

    /// Type tag derived from the entity_id prefix
    pub fn domain(&self) -> &str {
        split_entity_id(&self.entity_id).0
    }

    pub fn object_id(&self) -> &str {
        split_entity_id(&self.entity_id).1
    }

    /// Friendly name attribute, or the object id with underscores as spaces
    pub fn name(&self) -> String {
        match self.attr_str("friendly_name") {
            Some(name) => name.to_string(),
            None => self.object_id().replace('_', " "),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    /// Numeric attribute; numeric strings are accepted
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attr(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        self.attr(key).and_then(Value::as_bool)
    }

    /// String list attribute (e.g. "hvac_modes", "source_list")
    pub fn attr_list(&self, key: &str) -> Vec<String> {
        self.attr(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Split "domain.object_id"; an id without a dot has an empty object id
pub fn split_entity_id(entity_id: &str) -> (&str, &str) {
    entity_id.split_once('.').unwrap_or((entity_id, ""))
}

/// State change notification broadcast to subscribers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    pub old_state: Option<Entity>,
    pub new_state: Option<Entity>,
    pub timestamp: DateTime<Utc>,
}

/// Backend command issued by a directive handler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,

    /// Service parameters; always carries "entity_id"
    pub data: Map<String, Value>,

    /// Request context id linking the call to the originating directive
    pub context_id: Option<String>,
}

impl ServiceCall {
    pub fn new(domain: impl Into<String>, service: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            data,
            context_id: None,
        }
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}
