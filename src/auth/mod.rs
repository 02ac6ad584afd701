//! Token handling on both sides of the bridge.
//!
//! Inbound: bearer tokens on requests to the smart home endpoint.
//! Outbound: access tokens for the Alexa event gateway, obtained through a
//! [`TokenProvider`].

mod lwa;

pub use lwa::LwaTokenProvider;

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;


/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, BearerError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, BearerError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(BearerError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(BearerError::InvalidFormat);
    }

    let token = parts[1].trim();
    if token.is_empty() {
        return Err(BearerError::Empty);
    }

    Ok(token.to_string())
}

/// Bearer token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum BearerError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>"
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for BearerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BearerError::Missing => write!(f, "Authorization token not provided"),
            BearerError::InvalidFormat => write!(f, "Invalid authorization token format"),
            BearerError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for BearerError {}

/// Access token for the Alexa event gateway
#[derive(Clone, Debug, PartialEq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(access_token: impl Into<String>, expires_in_seconds: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
        }
    }

    /// Valid with at least a minute to spare
    pub fn is_valid(&self) -> bool {
        Utc::now() + Duration::seconds(60) < self.expires_at
    }
}

/// Failures obtaining an access token
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    /// No grant has been accepted yet
    #[error("No access token available")]
    NoTokenAvailable,

    /// The stored grant was revoked; the account must be linked again
    #[error("Account must be relinked")]
    RequireRelink,

    #[error("Token request failed: {0}")]
    Request(String),
}

/// Source of event gateway access tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a fresh access token
    async fn refresh(&self) -> Result<AccessToken, TokenError>;

    /// Exchange an AcceptGrant authorization code for tokens
    async fn accept_grant(&self, code: &str) -> Result<AccessToken, TokenError>;
}
