//! Authorization-code handshake: consent URL issuance and callback handling.

use super::error::{CallbackError, OAuthError};
use super::exchange::TokenGrant;
use super::state_manager::StateManager;
use super::token_manager::TokenManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where the most recent authorization attempt stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Idle,
    AwaitingCallback,
    Complete,
    Failed,
}

/// A consent URL and the state token it is bound to
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
    pub auth_url: String,
    pub state: String,
}

/// OAuth callback query parameters
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub struct AuthorizationFlow {
    tokens: Arc<TokenManager>,
    states: StateManager,
    status: RwLock<FlowStatus>,
}

impl AuthorizationFlow {
    pub fn new(tokens: Arc<TokenManager>, states: StateManager) -> Self {
        Self {
            tokens,
            states,
            status: RwLock::new(FlowStatus::Idle),
        }
    }

    pub async fn status(&self) -> FlowStatus {
        *self.status.read().await
    }

    /// Record a fresh CSRF state and build the consent URL bound to it.
    pub async fn begin_authorization(&self) -> Result<AuthorizationRequest, OAuthError> {
        let provider = self.tokens.client().provider();

        // Fail before recording a state nobody can use
        provider.client_id()?;

        let state = self.states.create_state().await?;
        let auth_url = provider.build_auth_url(&state)?;

        *self.status.write().await = FlowStatus::AwaitingCallback;

        tracing::info!(
            redirect_uri = %provider.redirect_uri,
            scopes = ?provider.scopes,
            "Authorization URL generated"
        );

        Ok(AuthorizationRequest { auth_url, state })
    }

    /// Validate the callback's state, exchange its code, and store the tokens.
    ///
    /// The state is consumed before the exchange is attempted, so it cannot
    /// be replayed even when the exchange fails.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<TokenGrant, OAuthError> {
        if let Some(error) = params.error {
            let reason = match params.error_description {
                Some(description) => format!("{} - {}", error, description),
                None => error,
            };
            tracing::warn!(reason = %reason, "Authorization denied by provider");
            *self.status.write().await = FlowStatus::Failed;
            return Err(CallbackError::ProviderDenied(reason).into());
        }

        let removed = self.states.cleanup_expired().await?;
        if removed > 0 {
            tracing::debug!(removed, "Swept expired OAuth states");
        }

        let Some(state) = params.state.filter(|s| !s.is_empty()) else {
            tracing::warn!("Callback without state parameter");
            return Err(CallbackError::InvalidState.into());
        };

        if !self.states.validate_and_consume(&state).await? {
            tracing::warn!("Invalid or expired OAuth state (possible CSRF attempt)");
            return Err(CallbackError::InvalidState.into());
        }

        let Some(code) = params.code.filter(|c| !c.is_empty()) else {
            *self.status.write().await = FlowStatus::Failed;
            return Err(CallbackError::MissingCode.into());
        };

        let result = self.exchange_and_store(&code).await;

        let status = if result.is_ok() {
            FlowStatus::Complete
        } else {
            FlowStatus::Failed
        };
        *self.status.write().await = status;

        result
    }

    async fn exchange_and_store(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        let client = self.tokens.client();
        let credentials = client.provider().credentials()?;

        let grant = client.exchange_code(&credentials, code).await.map_err(|e| {
            tracing::error!(error = %e, "Authorization code exchange failed");
            if e.is_invalid_client() {
                CallbackError::InvalidClient(e)
            } else {
                CallbackError::ExchangeFailed(e)
            }
        })?;

        self.tokens.store_grant(&grant).await?;

        tracing::info!(
            has_refresh_token = grant.refresh_token.is_some(),
            expires_in = grant.lifetime_seconds(),
            "Authorization complete, tokens stored"
        );

        Ok(grant)
    }
}

#[cfg(test)]
mod tests;
