use crate::alexa::consts::NEVER_EXPOSED_ENTITIES;
use crate::alexa::state_report;
use crate::auth::{AccessToken, TokenError, TokenProvider};
use crate::config::{AuthStore, SmartHomeSettings};
use crate::state::EntityProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Timeout for every call to the event gateway
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live per-account configuration shared by directive handling and the
/// proactive reporter.
///
/// Mutable parts: the authorization flag (persisted through [`AuthStore`]),
/// the cached access token and the reporter task.
pub struct SmartHomeConfig {
    settings: Arc<SmartHomeSettings>,
    backend: Arc<dyn EntityProvider>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    store: AuthStore,

    /// Held across check-and-refresh so only one refresh runs at a time
    token: Mutex<Option<AccessToken>>,

    /// Reporter task; the mutex serializes enable/disable
    reporter: Mutex<Option<JoinHandle<()>>>,
    reporting: AtomicBool,

    http: reqwest::Client,
}

impl SmartHomeConfig {
    pub fn new(
        settings: SmartHomeSettings,
        backend: Arc<dyn EntityProvider>,
        token_provider: Option<Arc<dyn TokenProvider>>,
        store: AuthStore,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REPORT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            settings: Arc::new(settings),
            backend,
            token_provider,
            store,
            token: Mutex::new(None),
            reporter: Mutex::new(None),
            reporting: AtomicBool::new(false),
            http,
        }
    }

    pub fn settings(&self) -> Arc<SmartHomeSettings> {
        Arc::clone(&self.settings)
    }

    pub fn backend(&self) -> &Arc<dyn EntityProvider> {
        &self.backend
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn locale(&self) -> &str {
        &self.settings.locale
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.settings.endpoint.as_deref()
    }

    pub fn should_expose(&self, entity_id: &str) -> bool {
        !NEVER_EXPOSED_ENTITIES.contains(&entity_id) && self.settings.filter.matches(entity_id)
    }

    pub fn authorized(&self) -> bool {
        self.store.authorized()
    }

    /// Reporting is wanted: enabled, an endpoint exists and the account is linked
    pub fn should_report_state(&self) -> bool {
        self.settings.report_state && self.settings.endpoint.is_some() && self.authorized()
    }

    pub fn is_reporting_states(&self) -> bool {
        self.reporting.load(Ordering::SeqCst)
    }

    /// Update the authorization flag and start/stop reporting to match
    pub async fn set_authorized(self: &Arc<Self>, authorized: bool) {
        if self.store.authorized() == authorized {
            return;
        }

        self.store.set_authorized(authorized);
        info!(authorized, "Alexa authorization changed");

        if self.should_report_state() != self.is_reporting_states() {
            if self.should_report_state() {
                self.enable_proactive_mode().await;
            } else {
                self.disable_proactive_mode().await;
            }
        }
    }

    /// Drop the authorization after the gateway refused every token.
    ///
    /// Unlike `set_authorized(false)` this never starts a reporter, so the
    /// reporter itself may call it.
    pub async fn revoke_authorization(&self) {
        if !self.store.authorized() {
            return;
        }

        self.store.set_authorized(false);
        info!("Alexa authorization revoked");
        self.disable_proactive_mode().await;
    }

    /// Start the reporter task (no-op when already running)
    pub async fn enable_proactive_mode(self: &Arc<Self>) {
        let mut reporter = self.reporter.lock().await;
        if reporter.as_ref().map_or(false, |task| !task.is_finished()) {
            return;
        }

        // Subscribe before spawning so no change slips through
        let changes = self.backend.subscribe();
        let config = Arc::clone(self);
        *reporter = Some(tokio::spawn(state_report::run_reporter(config, changes)));
        self.reporting.store(true, Ordering::SeqCst);

        info!("Proactive state reporting enabled");
    }

    pub async fn disable_proactive_mode(&self) {
        let mut reporter = self.reporter.lock().await;
        if let Some(task) = reporter.take() {
            task.abort();
            info!("Proactive state reporting disabled");
        }
        self.reporting.store(false, Ordering::SeqCst);
    }

    /// Cached access token, refreshed when missing or about to expire
    pub async fn async_get_access_token(&self) -> Result<String, TokenError> {
        let provider = self
            .token_provider
            .as_ref()
            .ok_or(TokenError::NoTokenAvailable)?;

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_valid()) {
            return Ok(token.access_token.clone());
        }

        let token = provider.refresh().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    pub async fn async_invalidate_access_token(&self) {
        *self.token.lock().await = None;
    }

    /// Exchange an AcceptGrant code and cache the resulting token
    pub async fn async_accept_grant(&self, code: &str) -> Result<(), TokenError> {
        let provider = match &self.token_provider {
            Some(provider) => provider,
            None => {
                warn!("AcceptGrant received without token provider configured");
                return Ok(());
            }
        };

        let token = provider.accept_grant(code).await?;
        *self.token.lock().await = Some(token);
        Ok(())
    }

    pub fn supports_auth(&self) -> bool {
        self.token_provider.is_some()
    }

    /// Write pending authorization state immediately
    pub fn flush(&self) -> anyhow::Result<()> {
        self.store.flush()
    }
}
