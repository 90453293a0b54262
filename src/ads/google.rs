//! Google Ads REST client for click-conversion uploads.

use super::{call_with_auth, AuthRejection};
use crate::config::GoogleAdsConfig;
use crate::oauth::{OAuthError, TokenManager};
use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GoogleAdsError {
    #[error("Google Ads is not configured: missing {0}")]
    NotConfigured(&'static str),

    #[error("GOOGLE_CUSTOMER_ID must be a numeric value (e.g., 1234567890)")]
    InvalidCustomerId,

    #[error("no conversions to upload")]
    EmptyUpload,

    #[error(transparent)]
    Token(#[from] OAuthError),

    #[error("Google Ads API returned {status}")]
    Api { status: u16, body: Value },

    #[error("Google Ads request failed: {0}")]
    Transport(String),
}

impl AuthRejection for GoogleAdsError {
    fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}

/// Request body for `customers/{id}:uploadClickConversions`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickConversionUpload {
    pub conversions: Vec<Value>,
    #[serde(default = "default_partial_failure")]
    pub partial_failure: bool,
}

fn default_partial_failure() -> bool {
    true
}

/// HTTP client for the Google Ads REST API.
pub struct GoogleAdsClient {
    http: Client,
    config: GoogleAdsConfig,
}

impl GoogleAdsClient {
    pub fn new(config: GoogleAdsConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, config })
    }

    /// Customer id with dashes removed; must be all digits.
    pub fn customer_id(&self) -> Result<String, GoogleAdsError> {
        let raw = self
            .config
            .customer_id
            .as_deref()
            .ok_or(GoogleAdsError::NotConfigured("GOOGLE_CUSTOMER_ID"))?;
        normalize_customer_id(raw)
    }

    fn developer_token(&self) -> Result<&str, GoogleAdsError> {
        self.config
            .developer_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(GoogleAdsError::NotConfigured("GOOGLE_ADS_DEVELOPER_TOKEN"))
    }

    fn upload_url(&self, customer_id: &str) -> String {
        format!(
            "{}/{}/customers/{}:uploadClickConversions",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.api_version,
            customer_id
        )
    }

    /// Upload click conversions, retrying once with a refreshed token if the
    /// API rejects the current one.
    pub async fn upload_click_conversions(
        &self,
        tokens: &TokenManager,
        upload: &ClickConversionUpload,
    ) -> Result<Value, GoogleAdsError> {
        if upload.conversions.is_empty() {
            return Err(GoogleAdsError::EmptyUpload);
        }

        let customer_id = self.customer_id()?;
        let developer_token = self.developer_token()?;
        let login_customer_id = self
            .config
            .login_customer_id
            .as_deref()
            .map(|id| id.replace('-', ""));
        let url = self.upload_url(&customer_id);

        tracing::info!(
            customer_id = %customer_id,
            conversions = upload.conversions.len(),
            partial_failure = upload.partial_failure,
            "Uploading click conversions"
        );

        call_with_auth(tokens, |access_token| {
            let mut request = self
                .http
                .post(&url)
                .bearer_auth(access_token)
                .header("developer-token", developer_token)
                .json(upload);
            if let Some(login_customer_id) = &login_customer_id {
                request = request.header("login-customer-id", login_customer_id.as_str());
            }

            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| GoogleAdsError::Transport(e.to_string()))?;
                check_response(response).await
            }
        })
        .await
    }
}

fn normalize_customer_id(raw: &str) -> Result<String, GoogleAdsError> {
    let id = raw.trim().replace('-', "");
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(GoogleAdsError::InvalidCustomerId);
    }
    Ok(id)
}

async fn check_response(response: reqwest::Response) -> Result<Value, GoogleAdsError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GoogleAdsError::Transport(e.to_string()))?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "Google Ads API error");
        return Err(GoogleAdsError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}
