use crate::alexa::messages::DirectiveError;
use crate::alexa::smart_home::SmartHome;
use crate::auth::extract_bearer_token;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub smart_home: Arc<SmartHome>,

    /// When set, requests must carry `Authorization: Bearer <api_token>`
    pub api_token: Option<String>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    enabled: bool,
    authorized: bool,
    reporting: bool,
}

/// Create API router with the smart home endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/alexa/smart_home", post(handle_directive))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// POST /api/alexa/smart_home - Handle one Alexa directive
async fn handle_directive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    authorize(&headers, state.api_token.as_deref())?;

    let request: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON: {}", e)))?;

    let response = state.smart_home.handle_message(&request).await?;
    Ok(Json(response))
}

/// GET /health - Liveness plus integration status
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = state.smart_home.config();
    Json(HealthResponse {
        status: "ok",
        enabled: config.enabled(),
        authorized: config.authorized(),
        reporting: config.is_reporting_states(),
    })
}

/// Bearer check against the configured API token (if any)
fn authorize(headers: &HeaderMap, api_token: Option<&str>) -> Result<(), AppError> {
    let Some(expected) = api_token else {
        return Ok(());
    };

    let token = extract_bearer_token(headers).map_err(|e| AppError::Unauthorized(e.to_string()))?;
    if token != expected {
        warn!("Rejected smart home request with invalid token");
        return Err(AppError::Unauthorized("Invalid authorization token".to_string()));
    }
    Ok(())
}

/// Application error types
enum AppError {
    BadRequest(String),
    Unauthorized(String),
}

impl From<DirectiveError> for AppError {
    fn from(e: DirectiveError) -> Self {
        debug!(error = %e, "Rejected inbound message");
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
        };
        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}
