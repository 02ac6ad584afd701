// Backend entity-state provider contract and the in-memory store

mod entity;
mod store;

pub use entity::{split_entity_id, Entity, ServiceCall, StateChange};
pub use store::StateStore;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Home-automation backend as seen by the Alexa layer
///
/// Implementations own entity lifecycle; the Alexa layer only observes
/// snapshots and issues service calls.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// All entities in a stable order
    async fn list_entities(&self) -> Vec<Entity>;

    async fn get_entity(&self, entity_id: &str) -> Option<Entity>;

    /// Subscribe to entity state changes
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;

    /// Issue a backend command
    ///
    /// Returns the backend's verdict for blocking calls (`false` means the
    /// command was refused); non-blocking calls report `true` once queued.
    async fn call_service(&self, call: ServiceCall, blocking: bool) -> Result<bool>;

    /// Start an HLS stream for a camera and return its URL path
    async fn request_stream(&self, entity_id: &str) -> Result<String> {
        anyhow::bail!("Backend cannot stream {}", entity_id)
    }

    /// False once the backend is shutting down
    fn is_running(&self) -> bool {
        true
    }
}
