//! Proactive events sent to the Alexa event gateway.
//!
//! The reporter task turns backend state changes into ChangeReport and
//! DoorbellPress events. Entities appearing or disappearing are announced
//! with AddOrUpdateReport and DeleteReport over the same delivery path.

use crate::alexa::capabilities::{STATE_UNAVAILABLE, STATE_UNKNOWN};
use crate::alexa::entities::{to_alexa_id, EntityAdapter, EntityKind};
use crate::alexa::messages::{now_timestamp, Response};
use crate::auth::TokenError;
use crate::config::SmartHomeConfig;
use crate::state::{split_entity_id, Entity, StateChange};
use dashmap::DashMap;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Gateway error code for an expired or revoked access token
pub const INVALID_ACCESS_TOKEN: &str = "INVALID_ACCESS_TOKEN_EXCEPTION";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No event gateway endpoint configured")]
    NoEndpoint,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Event gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Event gateway rejected {event} ({status}): {code} {description}")]
    Rejected {
        event: String,
        status: u16,
        code: String,
        description: String,
    },
}

/// What one state change should produce
#[derive(Debug, PartialEq)]
enum Report {
    Change,
    Doorbell,
    Nothing,
}

/// Event source triggered: binary sensors turning on, event entities firing
fn doorbell_pressed(old: Option<&Entity>, new: &Entity) -> bool {
    let old_state = old.map(|entity| entity.state.as_str());

    if new.domain() == "event" {
        new.state != STATE_UNAVAILABLE && new.state != STATE_UNKNOWN && old_state != Some(&new.state)
    } else {
        new.state == "on" && old_state != Some("on")
    }
}

/// Consumes state changes and keeps the last properties sent per entity
pub struct StateReporter {
    config: Arc<SmartHomeConfig>,

    /// entity_id -> fingerprints of the last ChangeReport delivered
    last_reported: DashMap<String, Vec<Value>>,
}

impl StateReporter {
    pub fn new(config: Arc<SmartHomeConfig>) -> Self {
        Self {
            config,
            last_reported: DashMap::new(),
        }
    }

    /// Emit at most one event for a backend state change.
    ///
    /// Delivery failures are logged, never returned.
    pub async fn handle_state_change(&self, change: &StateChange) {
        if !self.config.backend().is_running() {
            return;
        }

        let Some(new_state) = &change.new_state else {
            self.last_reported.remove(&change.entity_id);
            if self.config.should_expose(&change.entity_id) {
                let ids = [change.entity_id.clone()];
                if let Err(e) = async_send_delete_message(&self.config, &ids).await {
                    warn!(entity_id = %change.entity_id, error = %e, "DeleteReport not delivered");
                }
            }
            return;
        };
        if !self.config.should_expose(&change.entity_id) {
            return;
        }
        let Some(adapter) = EntityAdapter::new(self.config.settings(), new_state.clone()) else {
            return;
        };

        // First sighting: the endpoint must exist before its state is reported
        if change.old_state.is_none() {
            let ids = [change.entity_id.clone()];
            if let Err(e) = async_send_add_or_update_message(&self.config, &ids).await {
                warn!(entity_id = %change.entity_id, error = %e, "AddOrUpdateReport not delivered");
            }
        }

        match self.classify(&adapter, change.old_state.as_ref(), new_state) {
            Report::Change => self.report_change(&adapter).await,
            Report::Doorbell => {
                if let Err(e) = send_doorbell_press(&self.config, &adapter).await {
                    warn!(entity_id = %change.entity_id, error = %e, "DoorbellPress not delivered");
                }
            }
            Report::Nothing => {}
        }
    }

    /// The first reportable or doorbell capability decides
    fn classify(&self, adapter: &EntityAdapter, old: Option<&Entity>, new: &Entity) -> Report {
        let interfaces = match adapter.interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(entity_id = %adapter.entity_id(), error = %e, "Cannot read capabilities");
                return Report::Nothing;
            }
        };

        for interface in &interfaces {
            if interface.properties_proactively_reported() {
                return Report::Change;
            }
            if interface.is_doorbell() {
                return if doorbell_pressed(old, new) {
                    Report::Doorbell
                } else {
                    Report::Nothing
                };
            }
        }
        Report::Nothing
    }

    async fn report_change(&self, adapter: &EntityAdapter) {
        let entity_id = adapter.entity_id();
        let properties = adapter.serialize_properties();
        if properties.is_empty() {
            return;
        }

        let fingerprints: Vec<Value> = properties.iter().map(|p| p.fingerprint()).collect();
        let unchanged = self
            .last_reported
            .get(entity_id)
            .map_or(false, |last| *last == fingerprints);
        if unchanged {
            debug!(entity_id = %entity_id, "Properties unchanged, ChangeReport suppressed");
            return;
        }

        let properties: Vec<Value> = properties
            .iter()
            .filter_map(|p| serde_json::to_value(p).ok())
            .collect();

        match send_change_report(&self.config, &adapter.alexa_id(), properties).await {
            Ok(()) => {
                self.last_reported.insert(entity_id.to_string(), fingerprints);
            }
            Err(e) => warn!(entity_id = %entity_id, error = %e, "ChangeReport not delivered"),
        }
    }
}

/// Reporter task body; ends when the backend closes its change stream
pub async fn run_reporter(
    config: Arc<SmartHomeConfig>,
    mut changes: broadcast::Receiver<StateChange>,
) {
    let reporter = StateReporter::new(config);
    info!("State reporter started");

    loop {
        match changes.recv().await {
            Ok(change) => reporter.handle_state_change(&change).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "State reporter lagging, changes dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    info!("State reporter stopped");
}

pub async fn send_change_report(
    config: &Arc<SmartHomeConfig>,
    alexa_id: &str,
    properties: Vec<Value>,
) -> Result<(), ReportError> {
    let mut payload = Map::new();
    payload.insert(
        "change".into(),
        json!({"cause": {"type": "APP_INTERACTION"}, "properties": properties}),
    );

    deliver(config, "ChangeReport", |token| {
        let mut message = Response::new("ChangeReport", "Alexa", payload.clone());
        message.set_endpoint_full(token, alexa_id);
        message.serialize()
    })
    .await
}

pub async fn send_doorbell_press(
    config: &Arc<SmartHomeConfig>,
    adapter: &EntityAdapter,
) -> Result<(), ReportError> {
    let mut payload = Map::new();
    payload.insert("cause".into(), json!({"type": "PHYSICAL_INTERACTION"}));
    payload.insert("timestamp".into(), json!(now_timestamp()));
    let alexa_id = adapter.alexa_id();

    deliver(config, "DoorbellPress", |token| {
        let mut message =
            Response::new("DoorbellPress", "Alexa.DoorbellEventSource", payload.clone());
        message.set_endpoint_full(token, &alexa_id);
        message.serialize()
    })
    .await
}

/// Announce new or changed endpoints; ids without an adapter are skipped
pub async fn async_send_add_or_update_message(
    config: &Arc<SmartHomeConfig>,
    entity_ids: &[String],
) -> Result<(), ReportError> {
    let settings = config.settings();
    let mut endpoints = Vec::new();

    for entity_id in entity_ids {
        let Some(entity) = config.backend().get_entity(entity_id).await else {
            continue;
        };
        let Some(adapter) = EntityAdapter::new(Arc::clone(&settings), entity) else {
            continue;
        };
        match adapter.serialize_discovery() {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(e) => error!(entity_id = %entity_id, error = %e, "Unable to serialize for discovery"),
        }
    }
    if endpoints.is_empty() {
        return Ok(());
    }

    deliver(config, "AddOrUpdateReport", |token| {
        let mut payload = Map::new();
        payload.insert("endpoints".into(), json!(endpoints));
        payload.insert("scope".into(), json!({"type": "BearerToken", "token": token}));
        Response::new("AddOrUpdateReport", "Alexa.Discovery", payload).serialize()
    })
    .await
}

/// Announce removed endpoints; ids of unsupported domains are skipped
pub async fn async_send_delete_message(
    config: &Arc<SmartHomeConfig>,
    entity_ids: &[String],
) -> Result<(), ReportError> {
    let endpoints: Vec<Value> = entity_ids
        .iter()
        .filter(|id| EntityKind::from_domain(split_entity_id(id).0).is_some())
        .map(|id| json!({"endpointId": to_alexa_id(id)}))
        .collect();
    if endpoints.is_empty() {
        return Ok(());
    }

    deliver(config, "DeleteReport", |token| {
        let mut payload = Map::new();
        payload.insert("endpoints".into(), json!(endpoints));
        payload.insert("scope".into(), json!({"type": "BearerToken", "token": token}));
        Response::new("DeleteReport", "Alexa.Discovery", payload).serialize()
    })
    .await
}

/// Fetch a token, or drop the authorization when the grant is gone
async fn access_token(config: &Arc<SmartHomeConfig>) -> Result<String, ReportError> {
    match config.async_get_access_token().await {
        Ok(token) => Ok(token),
        Err(e @ (TokenError::NoTokenAvailable | TokenError::RequireRelink)) => {
            warn!(error = %e, "No usable access token, marking account unauthorized");
            config.revoke_authorization().await;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// POST an event built around the current access token.
///
/// 202 is success. An invalid token is refreshed and the event sent once
/// more; every other failure ends delivery.
async fn deliver<F>(config: &Arc<SmartHomeConfig>, event: &str, build: F) -> Result<(), ReportError>
where
    F: Fn(&str) -> Value,
{
    let endpoint = config.endpoint().ok_or(ReportError::NoEndpoint)?.to_string();
    let mut retried = false;

    loop {
        let token = access_token(config).await?;
        let message = build(&token);

        let response = config
            .http()
            .post(&endpoint)
            .bearer_auth(&token)
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            debug!(event, "Proactive event delivered");
            return Ok(());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let code = body["payload"]["code"].as_str().unwrap_or_default().to_string();
        let description = body["payload"]["description"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if code == INVALID_ACCESS_TOKEN {
            if !retried {
                debug!(event, "Access token rejected, refreshing");
                config.async_invalidate_access_token().await;
                retried = true;
                continue;
            }
            error!(event, "Access token rejected twice, marking account unauthorized");
            config.revoke_authorization().await;
        }

        return Err(ReportError::Rejected {
            event: event.to_string(),
            status: status.as_u16(),
            code,
            description,
        });
    }
}

#[cfg(test)]
mod tests;
