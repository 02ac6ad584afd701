//! Inbound directive pipeline.
//!
//! Parse, resolve the endpoint, dispatch to a handler, merge the entity's
//! reportable properties and serialize. Every failure after parsing becomes
//! an ErrorResponse, so callers always get a well-formed envelope back.

use crate::alexa::entities::recover_entity_id;
use crate::alexa::errors::{AlexaError, HandlerResult};
use crate::alexa::handlers::{lookup, RequestContext};
use crate::alexa::messages::{Directive, DirectiveError, Response};
use crate::config::SmartHomeConfig;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Directive summary in an [`AuditEvent`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditRequest {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

/// Response summary in an [`AuditEvent`]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditResponse {
    pub namespace: String,
    pub name: String,
}

/// Published once per handled directive
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AuditEvent {
    pub request: AuditRequest,
    pub response: AuditResponse,
}

/// Request orchestrator shared by the HTTP layer
pub struct SmartHome {
    config: Arc<SmartHomeConfig>,
    audit_tx: broadcast::Sender<AuditEvent>,
}

impl SmartHome {
    pub fn new(config: Arc<SmartHomeConfig>) -> Self {
        let (audit_tx, _) = broadcast::channel(100);
        Self { config, audit_tx }
    }

    pub fn config(&self) -> &Arc<SmartHomeConfig> {
        &self.config
    }

    /// Subscribe to audit events of handled directives
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.audit_tx.subscribe()
    }

    /// Handle one inbound message.
    ///
    /// Only a malformed envelope or a foreign payload version is returned
    /// as an error; everything else yields a response envelope.
    pub async fn handle_message(&self, request: &Value) -> Result<Value, DirectiveError> {
        let mut directive = Directive::parse(request)?;
        debug!(
            namespace = %directive.namespace,
            name = %directive.name,
            endpoint = ?directive.endpoint_id(),
            "Received directive"
        );

        let response = match self.dispatch(&mut directive).await {
            Ok(response) => response,
            Err(err) => error_response(&directive, err),
        };

        self.publish(&directive, &response);
        Ok(response.serialize())
    }

    async fn dispatch(&self, directive: &mut Directive) -> HandlerResult<Response> {
        if !self.config.enabled() {
            return Err(AlexaError::BridgeUnreachable("Alexa API not enabled".into()));
        }

        // Any message from Alexa proves the account is linked
        self.config.set_authorized(true).await;

        if directive.has_endpoint() {
            directive.load_entity(&self.config).await?;
        }

        let Some(handler) = lookup(&directive.namespace, &directive.name) else {
            warn!(
                namespace = %directive.namespace,
                name = %directive.name,
                "Unsupported directive"
            );
            return Ok(directive.error("Alexa", "INTERNAL_ERROR", "Unsupported request", Map::new()));
        };

        let context = RequestContext::new();
        let mut response = handler(&self.config, directive, &context).await?;

        if let Ok(adapter) = directive.adapter() {
            response.merge_context_properties(adapter);
        }
        Ok(response)
    }

    fn publish(&self, directive: &Directive, response: &Response) {
        let event = AuditEvent {
            request: AuditRequest {
                namespace: directive.namespace.clone(),
                name: directive.name.clone(),
                entity_id: directive.endpoint_id().map(recover_entity_id),
            },
            response: AuditResponse {
                namespace: response.namespace.clone(),
                name: response.name.clone(),
            },
        };
        debug!(
            request = %format!("{}.{}", event.request.namespace, event.request.name),
            entity_id = ?event.request.entity_id,
            response = %format!("{}.{}", event.response.namespace, event.response.name),
            "Directive handled"
        );

        // No subscribers is fine
        let _ = self.audit_tx.send(event);
    }
}

/// The one place typed failures become ErrorResponse events
fn error_response(directive: &Directive, err: AlexaError) -> Response {
    match &err {
        AlexaError::Other(e) => error!(
            namespace = %directive.namespace,
            name = %directive.name,
            error = ?e,
            "Uncaught failure processing directive"
        ),
        typed => info!(
            namespace = %directive.namespace,
            name = %directive.name,
            error_type = typed.error_type(),
            error = %typed,
            "Directive failed"
        ),
    }

    directive.error(err.namespace(), err.error_type(), &err.public_message(), err.payload())
}
