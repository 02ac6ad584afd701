//! Login with Amazon token exchange.

use crate::auth::{AccessToken, TokenError, TokenProvider};
use crate::config::AuthSettings;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Token endpoint response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Token endpoint error body
#[derive(Deserialize, Debug, Default)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`TokenProvider`] backed by the Login with Amazon token endpoint
pub struct LwaTokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,

    /// Replaced whenever the endpoint issues a new one
    refresh_token: Mutex<Option<String>>,
}

impl LwaTokenProvider {
    pub fn new(settings: &AuthSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            refresh_token: Mutex::new(settings.refresh_token.clone()),
        }
    }

    async fn request_token(&self, form: &HashMap<&str, &str>) -> Result<AccessToken, TokenError> {
        debug!(grant_type = form.get("grant_type").copied().unwrap_or(""), "Requesting access token");

        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: TokenErrorResponse = response.json().await.unwrap_or_default();
            warn!(
                status = %status,
                error = %body.error,
                description = ?body.error_description,
                "Token request rejected"
            );
            if body.error == "invalid_grant" {
                return Err(TokenError::RequireRelink);
            }
            return Err(TokenError::Request(format!("status {}: {}", status, body.error)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Request(format!("invalid token response: {}", e)))?;

        if let Some(refresh_token) = token.refresh_token {
            *self.refresh_token.lock().await = Some(refresh_token);
        }

        Ok(AccessToken::new(token.access_token, token.expires_in))
    }
}

#[async_trait]
impl TokenProvider for LwaTokenProvider {
    async fn refresh(&self) -> Result<AccessToken, TokenError> {
        let refresh_token = self
            .refresh_token
            .lock()
            .await
            .clone()
            .ok_or(TokenError::NoTokenAvailable)?;

        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token.as_str());
        form.insert("client_id", self.client_id.as_str());
        form.insert("client_secret", self.client_secret.as_str());

        self.request_token(&form).await
    }

    async fn accept_grant(&self, code: &str) -> Result<AccessToken, TokenError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("client_id", self.client_id.as_str());
        form.insert("client_secret", self.client_secret.as_str());

        self.request_token(&form).await
    }
}
