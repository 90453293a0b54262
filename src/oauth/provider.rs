//! OAuth provider configuration.
//!
//! Endpoints, scopes, and client credentials for the Google Ads consent flow.

use super::error::OAuthError;
use crate::config::OAuthConfig;

/// Client id/secret pair sent to the token endpoint
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// OAuth provider configuration
#[derive(Clone, Debug)]
pub struct OAuthProvider {
    /// Authorization (consent) endpoint URL
    pub auth_url: String,

    /// Token endpoint URL (code exchange and refresh)
    pub token_url: String,

    /// Token introspection endpoint URL
    pub tokeninfo_url: String,

    /// Requested scopes
    pub scopes: Vec<String>,

    /// Where the provider sends the user back to
    pub redirect_uri: String,

    client_id: Option<String>,
    client_secret: Option<String>,
}

impl OAuthProvider {
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            tokeninfo_url: config.tokeninfo_url.clone(),
            scopes: config.scopes.clone(),
            redirect_uri: config.redirect_uri.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// The configured client id, or a configuration error naming the variable.
    pub fn client_id(&self) -> Result<&str, OAuthError> {
        self.client_id.as_deref().ok_or_else(|| {
            OAuthError::Config("Missing GOOGLE_CLIENT_ID environment variable".to_string())
        })
    }

    /// Both client credentials, as needed by the token endpoint.
    pub fn credentials(&self) -> Result<ClientCredentials, OAuthError> {
        let client_id = self.client_id()?.to_string();
        let client_secret = self.client_secret.clone().ok_or_else(|| {
            OAuthError::Config("Missing GOOGLE_CLIENT_SECRET environment variable".to_string())
        })?;

        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }

    /// Build the consent URL bound to `state`.
    ///
    /// Requests offline access with forced consent so a refresh token is
    /// issued even when the user has authorized this client before.
    pub fn build_auth_url(&self, state: &str) -> Result<String, OAuthError> {
        let scopes = self.scopes.join(" ");
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.auth_url,
            urlencoding::encode(self.client_id()?),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        ))
    }
}
