use super::{AppError, AppState};
use crate::oauth::{CallbackParams, FlowStatus, TokenInfo};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Characters of a state token shown by /state-info
const STATE_PREVIEW_CHARS: usize = 16;

pub(super) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/authorize", get(authorize))
        .route("/callback", get(callback))
        .route("/refresh", post(refresh))
        .route("/validate", get(validate))
        .route("/clear-states", post(clear_states))
        .route("/state-info", get(state_info))
}

#[derive(Serialize)]
struct AuthorizeResponse {
    ok: bool,
    #[serde(rename = "authUrl")]
    auth_url: String,
    state: String,
}

#[derive(Serialize)]
struct CallbackResponse {
    ok: bool,
    message: &'static str,
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_in: i64,
    token_type: String,
}

#[derive(Deserialize, Default)]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct RefreshResponse {
    ok: bool,
    message: &'static str,
    access_token: String,
    expires_in: i64,
    token_type: String,
}

#[derive(Serialize)]
struct ValidatedToken {
    issued_to: Option<String>,
    audience: Option<String>,
    user_id: Option<String>,
    scope: Option<String>,
    expires_in: Option<i64>,
    is_valid: bool,
    cached_info: TokenInfo,
}

#[derive(Serialize)]
struct ValidateResponse {
    ok: bool,
    message: &'static str,
    token_info: ValidatedToken,
}

#[derive(Serialize)]
struct MessageResponse {
    ok: bool,
    message: &'static str,
}

#[derive(Serialize)]
struct StateSummary {
    state: String,
    created_at: DateTime<Utc>,
    expires_in_seconds: i64,
}

#[derive(Serialize)]
struct StateInfoResponse {
    ok: bool,
    state_count: usize,
    state_timeout_seconds: i64,
    flow_status: FlowStatus,
    states: Vec<StateSummary>,
}

/// GET /oauth/authorize
///
/// Returns the consent URL for the operator to open, bound to a fresh
/// CSRF state.
async fn authorize(State(state): State<Arc<AppState>>) -> Result<Json<AuthorizeResponse>, AppError> {
    let request = state.flow.begin_authorization().await?;

    Ok(Json(AuthorizeResponse {
        ok: true,
        auth_url: request.auth_url,
        state: request.state,
    }))
}

/// GET /oauth/callback
///
/// Provider redirect target. Validates and consumes the state, exchanges the
/// code, and stores the resulting tokens.
async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackResponse>, AppError> {
    debug!(
        has_code = params.code.is_some(),
        has_error = params.error.is_some(),
        "OAuth callback received"
    );

    let grant = state.flow.handle_callback(params).await?;

    Ok(Json(CallbackResponse {
        ok: true,
        message: "Successfully authenticated with Google Ads API. Tokens stored automatically.",
        expires_in: grant.lifetime_seconds(),
        token_type: grant.token_type().to_string(),
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
    }))
}

/// POST /oauth/refresh
///
/// Uses the body's refresh token if given, else the stored one, else the
/// configured one.
async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RefreshRequest>>,
) -> Result<Json<RefreshResponse>, AppError> {
    let body_token = body
        .and_then(|Json(request)| request.refresh_token)
        .filter(|token| !token.is_empty());

    let issued = if let Some(token) = body_token {
        debug!("Refreshing with request-supplied refresh token");
        state.tokens.refresh_with_token(&token).await?
    } else if state.tokens.token_info().await.has_refresh_token {
        state.tokens.refresh_access_token().await?
    } else if let Some(token) = &state.configured_refresh_token {
        debug!("Refreshing with configured refresh token");
        state.tokens.refresh_with_token(token).await?
    } else {
        warn!("Refresh requested with no refresh token available");
        return Err(AppError::BadRequest(
            "No refresh token provided. Include refresh_token in the request body or set GOOGLE_ADS_REFRESH_TOKEN".to_string(),
        ));
    };

    info!(expires_in = issued.expires_in, "Access token refreshed on request");

    Ok(Json(RefreshResponse {
        ok: true,
        message: "Access token refreshed successfully and stored automatically",
        access_token: issued.access_token,
        expires_in: issued.expires_in,
        token_type: issued.token_type,
    }))
}

/// GET /oauth/validate
async fn validate(State(state): State<Arc<AppState>>) -> Result<Json<ValidateResponse>, AppError> {
    let (introspection, cached_info) = state.tokens.validate().await?;

    info!(scope = ?introspection.scope, expires_in = ?introspection.expires_in, "Access token is valid");

    Ok(Json(ValidateResponse {
        ok: true,
        message: "Access token is valid",
        token_info: ValidatedToken {
            issued_to: introspection.issued_to,
            audience: introspection.audience,
            user_id: introspection.user_id,
            scope: introspection.scope,
            expires_in: introspection.expires_in,
            is_valid: true,
            cached_info,
        },
    }))
}

/// POST /oauth/clear-states
async fn clear_states(State(state): State<Arc<AppState>>) -> Result<Json<MessageResponse>, AppError> {
    state
        .states
        .clear()
        .await
        .map_err(|e| AppError::ServerError(format!("Failed to clear states: {:#}", e)))?;

    info!("All OAuth states cleared");

    Ok(Json(MessageResponse {
        ok: true,
        message: "All OAuth states cleared successfully",
    }))
}

/// GET /oauth/state-info
async fn state_info(State(state): State<Arc<AppState>>) -> Json<StateInfoResponse> {
    let states: Vec<StateSummary> = state
        .states
        .pending()
        .await
        .into_iter()
        .map(|pending| StateSummary {
            state: preview(&pending.state),
            created_at: pending.created_at,
            expires_in_seconds: pending.expires_in_seconds,
        })
        .collect();

    Json(StateInfoResponse {
        ok: true,
        state_count: states.len(),
        state_timeout_seconds: state.states.ttl().num_seconds(),
        flow_status: state.flow.status().await,
        states,
    })
}

fn preview(state: &str) -> String {
    let head: String = state.chars().take(STATE_PREVIEW_CHARS).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_preview_truncates() {
        let state = "0123456789abcdef0123456789abcdef";
        assert_eq!(preview(state), "0123456789abcdef...");
    }

    #[test]
    fn test_refresh_request_body_is_optional() {
        let request: RefreshRequest = serde_json::from_str("{}").unwrap();
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_callback_response_omits_missing_refresh_token() {
        let response = CallbackResponse {
            ok: true,
            message: "ok",
            access_token: "AT".to_string(),
            refresh_token: None,
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["expires_in"], 3600);
    }
}
