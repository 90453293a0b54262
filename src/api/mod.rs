// HTTP surface: OAuth handshake/diagnostics and Google Ads forwarding

pub mod google;
pub mod oauth;

use crate::ads::{GoogleAdsClient, GoogleAdsError};
use crate::oauth::{AuthorizationFlow, CallbackError, OAuthError, StateManager, TokenManager};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub flow: Arc<AuthorizationFlow>,
    pub states: StateManager,
    pub google_ads: Arc<GoogleAdsClient>,
    /// Last-resort refresh token for POST /oauth/refresh
    pub configured_refresh_token: Option<String>,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .nest("/oauth", oauth::routes())
        .nest("/google", google::routes())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

/// GET / - Liveness check
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "leadrelay is running",
    })
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
    BadGateway(String),
    Upstream { status: StatusCode, details: Value },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, None),
            AppError::Upstream { status, details } => (
                status,
                format!("Google Ads API returned {}", status.as_u16()),
                Some(details),
            ),
        };

        let body = Json(ErrorResponse {
            ok: false,
            error,
            details,
        });

        (status, body).into_response()
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        let message = err.to_string();
        match err {
            OAuthError::Config(_) => AppError::BadRequest(message),
            OAuthError::Callback(CallbackError::InvalidClient(_)) => AppError::Unauthorized(message),
            OAuthError::Callback(CallbackError::ExchangeFailed(_)) => AppError::ServerError(message),
            OAuthError::Callback(_) => AppError::BadRequest(message),
            OAuthError::Auth(_) | OAuthError::Validation(_) => AppError::Unauthorized(message),
            OAuthError::Storage(_) => {
                tracing::error!(error = %message, "Storage failure");
                AppError::ServerError(message)
            }
        }
    }
}

impl From<GoogleAdsError> for AppError {
    fn from(err: GoogleAdsError) -> Self {
        match err {
            GoogleAdsError::Token(e) => e.into(),
            GoogleAdsError::Api { status, body } => AppError::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                details: body,
            },
            GoogleAdsError::Transport(msg) => AppError::BadGateway(msg),
            e @ (GoogleAdsError::NotConfigured(_)
            | GoogleAdsError::InvalidCustomerId
            | GoogleAdsError::EmptyUpload) => AppError::BadRequest(e.to_string()),
        }
    }
}
