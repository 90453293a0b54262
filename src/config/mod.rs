//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden from environment
//! variables so deployments can keep secrets out of the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Complete leadrelay configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub google_ads: GoogleAdsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// OAuth provider and token lifecycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_tokeninfo_url")]
    pub tokeninfo_url: String,
    /// How long a CSRF state stays valid (seconds)
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
    /// How often expired states are swept (seconds)
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
    /// Timeout applied to every call to the provider (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Seeds the credential record when the durable store is empty
    #[serde(default)]
    pub access_token: Option<String>,
    /// Seeds the credential record and backs `/oauth/refresh` as a last resort
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/oauth/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/adwords".to_string()]
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_tokeninfo_url() -> String {
    "https://www.googleapis.com/oauth2/v1/tokeninfo".to_string()
}

fn default_state_ttl() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            tokeninfo_url: default_tokeninfo_url(),
            state_ttl_seconds: default_state_ttl(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
            request_timeout_seconds: default_request_timeout(),
            access_token: None,
            refresh_token: None,
        }
    }
}

/// Which durable backend holds the credential record and pending states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per file, rewritten atomically
    Json,
    /// Encrypted documents in a SQLite database
    Sqlite,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_states_path")]
    pub states_path: PathBuf,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
    /// Base64-encoded 32-byte key, required by the sqlite backend
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Json
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from(".tokens.json")
}

fn default_states_path() -> PathBuf {
    PathBuf::from(".oauth_states.json")
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("leadrelay.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            credentials_path: default_credentials_path(),
            states_path: default_states_path(),
            sqlite_path: default_sqlite_path(),
            encryption_key: None,
        }
    }
}

/// Google Ads API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleAdsConfig {
    #[serde(default = "default_ads_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_ads_version")]
    pub api_version: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub developer_token: Option<String>,
    /// Manager (MCC) account id, sent as `login-customer-id` when set
    #[serde(default)]
    pub login_customer_id: Option<String>,
}

fn default_ads_base_url() -> String {
    "https://googleads.googleapis.com".to_string()
}

fn default_ads_version() -> String {
    "v22".to_string()
}

impl Default for GoogleAdsConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_ads_base_url(),
            api_version: default_ads_version(),
            customer_id: None,
            developer_token: None,
            login_customer_id: None,
        }
    }
}

impl RelayConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Values are trimmed and stripped of surrounding quotes; empty values
    /// leave the current setting untouched.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(|v| clean_value(&v));

        if let Some(v) = get("PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %v, "Ignoring unparsable PORT"),
            }
        }
        if let Some(v) = get("GOOGLE_CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLIENT_SECRET") {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = get("OAUTH_REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        // Milliseconds, for compatibility with existing deployments
        if let Some(v) = get("OAUTH_STATE_TIMEOUT") {
            match v.parse::<i64>() {
                // Rounded up so a sub-second value still yields a usable TTL
                Ok(ms) if ms > 0 => self.oauth.state_ttl_seconds = ms.saturating_add(999) / 1000,
                _ => tracing::warn!(value = %v, "Ignoring invalid OAUTH_STATE_TIMEOUT"),
            }
        }
        if let Some(v) = get("GOOGLE_ADS_ACCESS_TOKEN") {
            self.oauth.access_token = Some(v);
        }
        if let Some(v) = get("GOOGLE_ADS_REFRESH_TOKEN") {
            self.oauth.refresh_token = Some(v);
        }
        if let Some(v) = get("GOOGLE_CUSTOMER_ID") {
            self.google_ads.customer_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_ADS_DEVELOPER_TOKEN") {
            self.google_ads.developer_token = Some(v);
        }
        if let Some(v) = get("GOOGLE_LOGIN_CUSTOMER_ID") {
            self.google_ads.login_customer_id = Some(v);
        }
        if let Some(v) = get("LEADRELAY_STORAGE_BACKEND") {
            match StorageBackend::parse(&v) {
                Some(backend) => self.storage.backend = backend,
                None => tracing::warn!(value = %v, "Ignoring unknown LEADRELAY_STORAGE_BACKEND"),
            }
        }
        if let Some(v) = get("LEADRELAY_ENCRYPTION_KEY") {
            self.storage.encryption_key = Some(v);
        }
    }
}

impl RelayConfig {
    /// Raise intervals that must be positive to one second.
    ///
    /// A zero state TTL would reject every callback, and a zero sweep
    /// interval is not accepted by the timer.
    pub fn enforce_minimums(&mut self) {
        if self.oauth.state_ttl_seconds < 1 {
            tracing::warn!(
                configured = self.oauth.state_ttl_seconds,
                "state_ttl_seconds must be positive, using 1"
            );
            self.oauth.state_ttl_seconds = 1;
        }
        if self.oauth.state_cleanup_interval_seconds == 0 {
            tracing::warn!("state_cleanup_interval_seconds must be positive, using 1");
            self.oauth.state_cleanup_interval_seconds = 1;
        }
    }
}

/// Trim whitespace and one layer of matching quotes from a configured value.
pub fn clean_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}

/// Load configuration from a TOML file (if it exists), then apply the environment.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?
    } else {
        RelayConfig::default()
    };

    config.apply_env();
    config.enforce_minimums();
    Ok(config)
}
