//! Error taxonomy for the authorization flow and token lifecycle.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// An error reported by (or while talking to) the OAuth provider.
///
/// `code` is the provider's `error` field when it sent one, otherwise a
/// local classification such as `network_error` or `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub status: Option<u16>,
    pub code: String,
    pub description: Option<String>,
}

/// Standard OAuth 2.0 error body
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, description: Option<String>) -> Self {
        Self {
            status: None,
            code: code.into(),
            description,
        }
    }

    /// Classify a transport failure. Timeouts are kept distinguishable in
    /// logs but are otherwise handled like any network failure.
    pub fn transport(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "timeout"
        } else {
            "network_error"
        };
        Self::new(code, Some(err.to_string()))
    }

    /// Build from a non-success HTTP response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self {
                status: Some(status),
                code: parsed.error,
                description: parsed.error_description,
            },
            Err(_) => Self {
                status: Some(status),
                code: format!("http_{}", status),
                description: (!body.trim().is_empty()).then(|| body.trim().to_string()),
            },
        }
    }

    /// The provider rejected our client id/secret pair.
    pub fn is_invalid_client(&self) -> bool {
        self.code == "invalid_client"
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.code, description),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Failures of the token lifecycle (obtaining a usable access token).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no refresh token")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    RefreshFailed(ProviderError),
}

/// Failures of the authorization callback. None of these are retried; the
/// user has to start a fresh authorization.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("provider denied authorization: {0}")]
    ProviderDenied(String),

    #[error("invalid or expired state")]
    InvalidState,

    #[error("missing code")]
    MissingCode,

    #[error("invalid client credentials: {0}")]
    InvalidClient(ProviderError),

    #[error("token exchange failed: {0}")]
    ExchangeFailed(ProviderError),
}

/// Top-level error for every OAuth operation.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("access token rejected by provider: {0}")]
    Validation(ProviderError),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for OAuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
