use crate::state::entity::{Entity, ServiceCall, StateChange};
use crate::state::EntityProvider;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// In-memory entity store implementing [`EntityProvider`]
///
/// Holds the latest snapshot per entity, broadcasts every change and
/// records each service call it receives. Service calls do not mutate
/// state by themselves; the owner of the store applies their effects.
pub struct StateStore {
    /// Lock-free concurrent map for fast reads
    entities: DashMap<String, Entity>,

    /// Broadcast channel for state change events
    state_tx: broadcast::Sender<StateChange>,

    /// Every service call received, in arrival order
    calls: Mutex<Vec<ServiceCall>>,

    /// Results returned for specific "domain.service" pairs (default true)
    service_results: DashMap<String, bool>,

    /// Cleared when the backend begins shutting down
    running: AtomicBool,
}

impl StateStore {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(1000);

        Self {
            entities: DashMap::new(),
            state_tx,
            calls: Mutex::new(Vec::new()),
            service_results: DashMap::new(),
            running: AtomicBool::new(true),
        }
    }

    /// Create or replace an entity and broadcast the change
    pub fn set_state(&self, entity_id: &str, state: &str, attributes: Value) -> StateChange {
        let new_state = Entity::new(entity_id, state, attributes);
        let old_state = self.entities.insert(entity_id.to_string(), new_state.clone());

        let change = StateChange {
            entity_id: entity_id.to_string(),
            old_state,
            new_state: Some(new_state),
            timestamp: Utc::now(),
        };

        // Send fails only when nobody is subscribed
        let _ = self.state_tx.send(change.clone());
        debug!(entity_id = %entity_id, state = %state, "Entity state set");

        change
    }

    /// Remove an entity and broadcast a change with no new state
    pub fn remove(&self, entity_id: &str) -> Option<Entity> {
        let removed = self.entities.remove(entity_id).map(|(_, entity)| entity);

        if removed.is_some() {
            let _ = self.state_tx.send(StateChange {
                entity_id: entity_id.to_string(),
                old_state: removed.clone(),
                new_state: None,
                timestamp: Utc::now(),
            });
            info!(entity_id = %entity_id, "Entity removed");
        }

        removed
    }

    /// Override the result of blocking calls to `domain.service`
    pub fn set_service_result(&self, domain: &str, service: &str, result: bool) {
        self.service_results
            .insert(format!("{}.{}", domain, service), result);
    }

    /// Service calls received so far
    pub async fn service_calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().await.clone()
    }

    /// Mark the backend as shutting down
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("State store stopping");
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityProvider for StateStore {
    async fn list_entities(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.entities.iter().map(|e| e.value().clone()).collect();
        // DashMap iteration order is arbitrary
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        entities
    }

    async fn get_entity(&self, entity_id: &str) -> Option<Entity> {
        self.entities.get(entity_id).map(|e| e.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    async fn call_service(&self, call: ServiceCall, blocking: bool) -> Result<bool> {
        if !self.is_running() {
            bail!("Backend is shutting down");
        }

        let key = format!("{}.{}", call.domain, call.service);
        debug!(service = %key, blocking, "Service call");
        self.calls.lock().await.push(call);

        let result = self.service_results.get(&key).map(|r| *r).unwrap_or(true);
        Ok(!blocking || result)
    }

    /// Streams are served from the camera's `stream_source` attribute
    async fn request_stream(&self, entity_id: &str) -> Result<String> {
        let Some(entity) = self.entities.get(entity_id) else {
            bail!("Unknown camera {}", entity_id);
        };
        match entity.attr_str("stream_source") {
            Some(path) => Ok(path.to_string()),
            None => bail!("{} has no stream source", entity_id),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
