use alexa_bridge::alexa::SmartHome;
use alexa_bridge::api::{create_router, AppState};
use alexa_bridge::auth::{LwaTokenProvider, TokenProvider};
use alexa_bridge::config::{load_config, AuthStore, SmartHomeConfig};
use alexa_bridge::state::StateStore;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alexa_bridge=info".into()),
        )
        .init();

    info!("Alexa bridge starting...");

    let config_path = std::env::var("ALEXA_BRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let bridge = load_config(&config_path)?.apply_env();
    info!(path = %config_path.display(), "Configuration loaded");

    // In-memory backend
    let store = Arc::new(StateStore::new());
    for seed in &bridge.entities {
        store.set_state(&seed.entity_id, &seed.state, Value::Object(seed.attributes.clone()));
    }
    info!(entities = store.len(), "Backend store ready");

    let token_provider: Option<Arc<dyn TokenProvider>> = if bridge.auth.is_configured() {
        Some(Arc::new(LwaTokenProvider::new(&bridge.auth)))
    } else {
        warn!("No Login with Amazon credentials, proactive reporting unavailable");
        None
    };

    let auth_store = AuthStore::load(&bridge.smart_home.storage_path)?;
    let config = Arc::new(SmartHomeConfig::new(
        bridge.smart_home.clone(),
        store.clone(),
        token_provider,
        auth_store,
    ));
    if config.should_report_state() {
        config.enable_proactive_mode().await;
    }

    let state = AppState {
        smart_home: Arc::new(SmartHome::new(Arc::clone(&config))),
        api_token: bridge.server.api_token.clone(),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bridge.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", bridge.server.bind))?;
    info!(bind = %bridge.server.bind, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    store.stop();
    config.disable_proactive_mode().await;
    config.flush()?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}
