//! Calls to the provider's token and tokeninfo endpoints.
//!
//! Handles the authorization-code grant, the refresh-token grant, and
//! access-token introspection. Every call carries the client timeout; a
//! timeout surfaces as a `ProviderError` like any other network failure.

use super::error::ProviderError;
use super::provider::{ClientCredentials, OAuthProvider};
use crate::credentials::DEFAULT_TOKEN_TYPE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lifetime assumed when the provider omits `expires_in`.
///
/// Kept short so a token of unknown lifetime is refreshed soon after the
/// 5-minute buffer rather than trusted for an hour.
pub const FALLBACK_LIFETIME_SECONDS: i64 = 600;

/// OAuth token response (standard OAuth 2.0)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenGrant {
    pub fn lifetime_seconds(&self) -> i64 {
        self.expires_in.unwrap_or(FALLBACK_LIFETIME_SECONDS)
    }

    pub fn token_type(&self) -> &str {
        self.token_type.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE)
    }
}

/// Provider's view of an access token
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenIntrospection {
    #[serde(default)]
    pub issued_to: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// HTTP client for the provider's token endpoints.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    provider: Arc<OAuthProvider>,
}

impl TokenClient {
    pub fn new(provider: Arc<OAuthProvider>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, provider })
    }

    pub fn provider(&self) -> &OAuthProvider {
        &self.provider
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
    ) -> Result<TokenGrant, ProviderError> {
        tracing::debug!(token_url = %self.provider.token_url, "Exchanging authorization code for token");

        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.provider.redirect_uri.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ])
        .await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError> {
        tracing::debug!(token_url = %self.provider.token_url, "Requesting refresh-token grant");

        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ])
        .await
    }

    /// Ask the provider whether `access_token` is currently valid.
    pub async fn introspect(&self, access_token: &str) -> Result<TokenIntrospection, ProviderError> {
        let response = self
            .http
            .get(&self.provider.tokeninfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| ProviderError::transport(&e))?;

        Self::parse_json(response).await
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let response = self
            .http
            .post(&self.provider.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&e))?;

        let grant: TokenGrant = Self::parse_json(response).await?;

        tracing::debug!(
            has_refresh_token = grant.refresh_token.is_some(),
            expires_in = ?grant.expires_in,
            "Token endpoint call successful"
        );

        Ok(grant)
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(&e))?;

        if !status.is_success() {
            return Err(ProviderError::from_response(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::new("invalid_response", Some(format!("{}", e)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthConfig;
    use mockito::{Matcher, Server};

    fn test_client(server_url: &str, timeout: Duration) -> TokenClient {
        let provider = OAuthProvider::from_config(&OAuthConfig {
            token_url: format!("{}/token", server_url),
            tokeninfo_url: format!("{}/tokeninfo", server_url),
            redirect_uri: "http://localhost:3000/oauth/callback".to_string(),
            client_id: Some("client-id".to_string()),
            client_secret: Some("client-secret".to_string()),
            ..OAuthConfig::default()
        });
        TokenClient::new(Arc::new(provider), timeout).unwrap()
    }

    fn test_credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        }
    }

    #[test]
    fn test_token_grant_deserialization() {
        let json = r#"{
            "access_token": "ya29.a0AfH6SM",
            "refresh_token": "1//0gLx",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "https://www.googleapis.com/auth/adwords"
        }"#;

        let grant: TokenGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.access_token, "ya29.a0AfH6SM");
        assert_eq!(grant.refresh_token.as_deref(), Some("1//0gLx"));
        assert_eq!(grant.lifetime_seconds(), 3599);
        assert_eq!(grant.token_type(), "Bearer");
    }

    #[test]
    fn test_token_grant_minimal() {
        let grant: TokenGrant = serde_json::from_str(r#"{"access_token": "t"}"#).unwrap();
        assert!(grant.refresh_token.is_none());
        assert_eq!(grant.lifetime_seconds(), FALLBACK_LIFETIME_SECONDS);
        assert_eq!(grant.token_type(), "Bearer");
    }

    #[tokio::test]
    async fn test_exchange_code_sends_form() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "abc".into()),
                Matcher::UrlEncoded("client_id".into(), "client-id".into()),
                Matcher::UrlEncoded("client_secret".into(), "client-secret".into()),
                Matcher::UrlEncoded(
                    "redirect_uri".into(),
                    "http://localhost:3000/oauth/callback".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "AT1", "refresh_token": "RT1", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), Duration::from_secs(5));
        let grant = client.exchange_code(&test_credentials(), "abc").await.unwrap();

        assert_eq!(grant.access_token, "AT1");
        assert_eq!(grant.refresh_token.as_deref(), Some("RT1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "invalid_grant", "error_description": "Bad Request"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url(), Duration::from_secs(5));
        let err = client.refresh(&test_credentials(), "1//stale").await.unwrap_err();

        assert_eq!(err.status, Some(400));
        assert_eq!(err.code, "invalid_grant");
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"token": "missing access_token field"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url(), Duration::from_secs(5));
        let err = client.refresh(&test_credentials(), "1//rt").await.unwrap_err();
        assert_eq!(err.code, "invalid_response");
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        // Nothing listens on port 9 (discard) in the test environment
        let client = test_client("http://127.0.0.1:9", Duration::from_secs(2));
        let err = client.refresh(&test_credentials(), "1//rt").await.unwrap_err();
        assert_eq!(err.code, "network_error");
        assert!(err.status.is_none());
    }

    #[tokio::test]
    async fn test_introspect() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/tokeninfo")
            .match_query(Matcher::UrlEncoded("access_token".into(), "ya29.valid".into()))
            .with_status(200)
            .with_body(r#"{"issued_to": "client-id", "audience": "client-id", "scope": "https://www.googleapis.com/auth/adwords", "expires_in": 3000}"#)
            .create_async()
            .await;
        let _invalid = server
            .mock("GET", "/tokeninfo")
            .match_query(Matcher::UrlEncoded("access_token".into(), "ya29.revoked".into()))
            .with_status(400)
            .with_body(r#"{"error": "invalid_token", "error_description": "Invalid Value"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url(), Duration::from_secs(5));

        let info = client.introspect("ya29.valid").await.unwrap();
        assert_eq!(info.audience.as_deref(), Some("client-id"));
        assert_eq!(info.expires_in, Some(3000));

        let err = client.introspect("ya29.revoked").await.unwrap_err();
        assert_eq!(err.code, "invalid_token");
    }
}
