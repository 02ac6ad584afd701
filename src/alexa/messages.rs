use crate::alexa::consts::{DATE_FORMAT, PAYLOAD_VERSION};
use crate::alexa::entities::{recover_entity_id, EntityAdapter};
use crate::alexa::errors::AlexaError;
use crate::config::SmartHomeConfig;
use crate::state::Entity;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Inbound envelope rejected before any Alexa-level processing
#[derive(Error, Debug, PartialEq)]
pub enum DirectiveError {
    #[error("Malformed directive: {0}")]
    Malformed(String),

    #[error("Unsupported payload version: {0}")]
    UnsupportedPayloadVersion(String),
}

/// Parsed Alexa directive
#[derive(Clone, Debug)]
pub struct Directive {
    pub namespace: String,
    pub name: String,
    pub correlation_token: Option<String>,

    /// Disambiguates Mode/Range/Toggle controllers on one endpoint
    pub instance: Option<String>,

    pub payload: Map<String, Value>,

    /// Verbatim inbound endpoint block
    endpoint_raw: Option<Value>,

    endpoint_id: Option<String>,

    /// Resolved by [`Directive::load_entity`]
    pub entity: Option<Entity>,
    pub endpoint: Option<EntityAdapter>,
}

impl Directive {
    /// Parse a `{"directive": {...}}` request body
    pub fn parse(request: &Value) -> Result<Self, DirectiveError> {
        let directive = request
            .get("directive")
            .and_then(Value::as_object)
            .ok_or_else(|| DirectiveError::Malformed("missing directive".into()))?;

        let header = directive
            .get("header")
            .and_then(Value::as_object)
            .ok_or_else(|| DirectiveError::Malformed("missing header".into()))?;

        let header_str = |key: &str| header.get(key).and_then(Value::as_str).map(str::to_string);

        let version = header_str("payloadVersion").unwrap_or_default();
        if version != PAYLOAD_VERSION {
            return Err(DirectiveError::UnsupportedPayloadVersion(version));
        }

        let namespace = header_str("namespace")
            .ok_or_else(|| DirectiveError::Malformed("missing header.namespace".into()))?;
        let name = header_str("name")
            .ok_or_else(|| DirectiveError::Malformed("missing header.name".into()))?;

        let endpoint_raw = directive.get("endpoint").filter(|e| e.is_object()).cloned();
        let endpoint_id = endpoint_raw
            .as_ref()
            .and_then(|e| e.get("endpointId"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let payload = match directive.get("payload") {
            Some(Value::Object(payload)) => payload.clone(),
            _ => Map::new(),
        };

        Ok(Self {
            namespace,
            name,
            correlation_token: header_str("correlationToken"),
            instance: header_str("instance"),
            payload,
            endpoint_raw,
            endpoint_id,
            entity: None,
            endpoint: None,
        })
    }

    pub fn has_endpoint(&self) -> bool {
        self.endpoint_raw.is_some()
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        self.endpoint_id.as_deref()
    }

    /// Resolve the target entity and build its adapter
    pub async fn load_entity(&mut self, config: &SmartHomeConfig) -> Result<(), AlexaError> {
        let endpoint_id = self.endpoint_id.clone().unwrap_or_default();
        let entity_id = recover_entity_id(&endpoint_id);

        let entity = match config.backend().get_entity(&entity_id).await {
            Some(entity) if config.should_expose(&entity_id) => entity,
            _ => {
                return Err(AlexaError::InvalidEndpoint(format!(
                    "The endpoint {} does not exist",
                    endpoint_id
                )))
            }
        };

        let adapter = EntityAdapter::new(config.settings(), entity.clone()).ok_or_else(|| {
            AlexaError::InvalidEndpoint(format!("The endpoint {} is not supported", endpoint_id))
        })?;

        self.entity = Some(entity);
        self.endpoint = Some(adapter);
        Ok(())
    }

    /// Resolved entity; handlers registered for endpoint directives only
    pub fn entity(&self) -> Result<&Entity, AlexaError> {
        self.entity.as_ref().ok_or_else(|| {
            AlexaError::InvalidDirective(format!("{}.{} requires an endpoint", self.namespace, self.name))
        })
    }

    pub fn adapter(&self) -> Result<&EntityAdapter, AlexaError> {
        self.endpoint.as_ref().ok_or_else(|| {
            AlexaError::InvalidDirective(format!("{}.{} requires an endpoint", self.namespace, self.name))
        })
    }

    /// Plain "Alexa.Response"
    pub fn response(&self) -> Response {
        self.response_with("Response", "Alexa", Map::new())
    }

    pub fn response_with(&self, name: &str, namespace: &str, payload: Map<String, Value>) -> Response {
        let mut response = Response::new(name, namespace, payload);

        if let Some(token) = &self.correlation_token {
            response.set_correlation_token(token);
        }

        if let Some(endpoint) = &self.endpoint_raw {
            response.set_endpoint(endpoint.clone());
        }

        response
    }

    /// ErrorResponse with `type` and `message` merged into the payload
    pub fn error(
        &self,
        namespace: &str,
        error_type: &str,
        message: &str,
        payload: Map<String, Value>,
    ) -> Response {
        let mut payload = payload;
        payload.insert("type".into(), json!(error_type));
        payload.insert("message".into(), json!(message));

        self.response_with("ErrorResponse", namespace, payload)
    }

    /// Payload field as string
    pub fn payload_str(&self, key: &str) -> Result<&str, AlexaError> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| AlexaError::InvalidValue(format!("Missing or invalid {}", key)))
    }

    /// Payload field as number; numeric strings are accepted
    pub fn payload_f64(&self, key: &str) -> Result<f64, AlexaError> {
        value_f64(self.payload.get(key))
            .ok_or_else(|| AlexaError::InvalidValue(format!("Missing or invalid {}", key)))
    }

    pub fn payload_bool(&self, key: &str) -> bool {
        match self.payload.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

pub(crate) fn value_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|v: &f64| v.is_finite()),
        _ => None,
    }
}

/// One entry of `context.properties` or a ChangeReport property list
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyReport {
    pub name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub value: Value,
    pub time_of_sample: String,
    pub uncertainty_in_milliseconds: u64,
}

impl PropertyReport {
    pub fn new(namespace: &str, name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            instance: None,
            value,
            time_of_sample: now_timestamp(),
            uncertainty_in_milliseconds: 0,
        }
    }

    pub fn with_instance(mut self, instance: Option<&str>) -> Self {
        self.instance = instance.map(str::to_string);
        self
    }

    /// Identity used for change detection (ignores sample time)
    pub fn fingerprint(&self) -> Value {
        json!([self.namespace, self.name, self.instance, self.value])
    }
}

/// Current UTC time in Alexa's timestamp format
pub fn now_timestamp() -> String {
    Utc::now().format(DATE_FORMAT).to_string()
}

/// Outbound Alexa event (response, error or proactive report)
#[derive(Clone, Debug)]
pub struct Response {
    pub namespace: String,
    pub name: String,
    pub message_id: String,
    pub correlation_token: Option<String>,
    pub endpoint: Option<Value>,
    pub payload: Map<String, Value>,

    /// `None` until a context property is added or merged
    properties: Option<Vec<PropertyReport>>,
}

impl Response {
    pub fn new(name: &str, namespace: &str, payload: Map<String, Value>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message_id: Uuid::new_v4().to_string(),
            correlation_token: None,
            endpoint: None,
            payload,
            properties: None,
        }
    }

    pub fn set_correlation_token(&mut self, token: &str) {
        self.correlation_token = Some(token.to_string());
    }

    pub fn set_endpoint(&mut self, endpoint: Value) {
        self.endpoint = Some(endpoint);
    }

    /// Endpoint block for proactive events: bearer scope plus endpoint id
    pub fn set_endpoint_full(&mut self, bearer_token: &str, endpoint_id: &str) {
        self.endpoint = Some(json!({
            "scope": {"type": "BearerToken", "token": bearer_token},
            "endpointId": endpoint_id,
        }));
    }

    pub fn add_context_property(&mut self, property: PropertyReport) {
        self.properties.get_or_insert_with(Vec::new).push(property);
    }

    /// Add the adapter's reportable properties that the handler did not set
    pub fn merge_context_properties(&mut self, adapter: &EntityAdapter) {
        let properties = self.properties.get_or_insert_with(Vec::new);

        for property in adapter.serialize_properties() {
            let exists = properties
                .iter()
                .any(|p| p.namespace == property.namespace && p.name == property.name);
            if !exists {
                properties.push(property);
            }
        }
    }

    pub fn context_properties(&self) -> &[PropertyReport] {
        self.properties.as_deref().unwrap_or(&[])
    }

    /// Full wire envelope
    pub fn serialize(&self) -> Value {
        let mut header = json!({
            "namespace": self.namespace,
            "name": self.name,
            "messageId": self.message_id,
            "payloadVersion": PAYLOAD_VERSION,
        });
        if let Some(token) = &self.correlation_token {
            header["correlationToken"] = json!(token);
        }

        let mut event = json!({
            "header": header,
            "payload": self.payload,
        });
        if let Some(endpoint) = &self.endpoint {
            event["endpoint"] = endpoint.clone();
        }

        let mut message = json!({ "event": event });
        if let Some(properties) = &self.properties {
            message["context"] = json!({ "properties": properties });
        }

        message
    }
}
