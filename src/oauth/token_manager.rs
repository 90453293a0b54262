//! Access-token lifecycle: cache, refresh, and write-through persistence.
//!
//! The manager is the only writer of the credential record. Every mutation
//! is saved to the durable store first and then swapped into the in-memory
//! cache as a whole record, so readers never see a new access token paired
//! with a stale expiry. Clearing after a failed refresh is the exception:
//! the cache is emptied first so a rejected token is never served, even if
//! the durable store is unavailable.

use super::error::{AuthError, OAuthError};
use super::exchange::{TokenClient, TokenGrant, TokenIntrospection};
use crate::credentials::{CredentialRecord, CredentialStore};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Tokens expiring within this window are treated as already expired.
pub const REFRESH_BUFFER_SECONDS: i64 = 300;

/// Read-only diagnostic snapshot of the credential record
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub expires_in_seconds: Option<i64>,
}

/// An access token handed out by a refresh
#[derive(Clone, Debug, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub struct TokenManager {
    client: TokenClient,
    store: Arc<dyn CredentialStore>,
    cache: RwLock<CredentialRecord>,
    /// Serializes every mutation, including refreshes (single flight).
    write_lock: Mutex<()>,
    buffer: Duration,
}

impl TokenManager {
    /// Build a manager whose cache starts as the durable record.
    pub fn load(client: TokenClient, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let record = store.load_credentials()?;

        tracing::info!(
            has_access_token = record.access_token.is_some(),
            has_refresh_token = record.refresh_token.is_some(),
            "Loaded stored credentials"
        );

        Ok(Self {
            client,
            store,
            cache: RwLock::new(record),
            write_lock: Mutex::new(()),
            buffer: Duration::seconds(REFRESH_BUFFER_SECONDS),
        })
    }

    pub fn client(&self) -> &TokenClient {
        &self.client
    }

    /// Seed an empty store from configured tokens.
    ///
    /// The expiry of a seeded access token is unknown, so it is refreshed on
    /// first use. Returns whether anything was written.
    pub async fn seed(
        &self,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        if !self.cache.read().await.is_empty() {
            return Ok(false);
        }
        if access_token.is_none() && refresh_token.is_none() {
            return Ok(false);
        }

        tracing::info!(
            has_access_token = access_token.is_some(),
            has_refresh_token = refresh_token.is_some(),
            "Seeding credentials from configuration"
        );

        self.commit(CredentialRecord {
            access_token,
            refresh_token,
            expires_at: None,
            token_type: None,
        })
        .await?;

        Ok(true)
    }

    /// Return a usable access token, refreshing first if the cached one is
    /// missing or inside the expiry buffer.
    pub async fn get_valid_access_token(&self) -> Result<String, OAuthError> {
        if let Some(token) = self.fresh_token(Utc::now()).await {
            return Ok(token);
        }

        let _guard = self.write_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = self.fresh_token(Utc::now()).await {
            tracing::debug!("Using token refreshed by concurrent caller");
            return Ok(token);
        }

        let issued = self.refresh_locked(None).await?;
        Ok(issued.access_token)
    }

    /// Refresh unconditionally using the stored refresh token.
    ///
    /// On provider or network failure the stored credentials are cleared so
    /// a full re-authorization is required.
    pub async fn refresh_access_token(&self) -> Result<IssuedToken, OAuthError> {
        let _guard = self.write_lock.lock().await;
        self.refresh_locked(None).await
    }

    /// Refresh with a caller-supplied refresh token and adopt it on success.
    ///
    /// Stored credentials are left alone if the supplied token is rejected.
    pub async fn refresh_with_token(&self, refresh_token: &str) -> Result<IssuedToken, OAuthError> {
        let _guard = self.write_lock.lock().await;
        self.refresh_locked(Some(refresh_token)).await
    }

    /// Overwrite the record after a code exchange.
    ///
    /// A `None` refresh token keeps whatever refresh token is already stored.
    pub async fn store_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        token_type: Option<String>,
    ) -> Result<(), OAuthError> {
        let _guard = self.write_lock.lock().await;

        let previous = self.cache.read().await.refresh_token.clone();
        let record = CredentialRecord {
            access_token: Some(access_token),
            refresh_token: refresh_token.or(previous),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
            token_type,
        };

        self.commit(record).await?;

        tracing::info!(expires_in, "Stored new access token");
        Ok(())
    }

    pub async fn store_grant(&self, grant: &TokenGrant) -> Result<(), OAuthError> {
        self.store_tokens(
            grant.access_token.clone(),
            grant.refresh_token.clone(),
            grant.lifetime_seconds(),
            Some(grant.token_type().to_string()),
        )
        .await
    }

    pub async fn token_info(&self) -> TokenInfo {
        self.token_info_at(Utc::now()).await
    }

    pub(crate) async fn token_info_at(&self, now: DateTime<Utc>) -> TokenInfo {
        let record = self.cache.read().await;
        TokenInfo {
            has_access_token: record.access_token.is_some(),
            has_refresh_token: record.refresh_token.is_some(),
            expires_at: record.expires_at,
            is_expired: record.is_expired_at(now, self.buffer),
            expires_in_seconds: record.expires_in_seconds_at(now),
        }
    }

    /// Get a valid token (refreshing if needed) and confirm it with the
    /// provider's introspection endpoint.
    pub async fn validate(&self) -> Result<(TokenIntrospection, TokenInfo), OAuthError> {
        let access_token = self.get_valid_access_token().await?;

        let introspection = self
            .client
            .introspect(&access_token)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Access token failed introspection");
                OAuthError::Validation(e)
            })?;

        Ok((introspection, self.token_info().await))
    }

    async fn fresh_token(&self, now: DateTime<Utc>) -> Option<String> {
        let record = self.cache.read().await;
        if record.is_expired_at(now, self.buffer) {
            return None;
        }
        record.access_token.clone()
    }

    /// Caller must hold `write_lock`.
    async fn refresh_locked(&self, explicit: Option<&str>) -> Result<IssuedToken, OAuthError> {
        let current = self.cache.read().await.clone();

        let refresh_token = match explicit {
            Some(token) => token.to_string(),
            None => current.refresh_token.clone().ok_or(AuthError::NoRefreshToken)?,
        };

        let credentials = self.client.provider().credentials()?;

        tracing::info!("Refreshing access token");

        let grant = match self.client.refresh(&credentials, &refresh_token).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh rejected");

                if explicit.is_none() {
                    if let Err(store_err) = self.clear_after_failure(current.token_type).await {
                        tracing::error!(error = %store_err, "Failed to persist cleared credentials");
                        return Err(OAuthError::Storage(store_err.context(format!(
                            "token refresh failed ({}) and the cleared record was not saved",
                            e
                        ))));
                    }
                }

                return Err(AuthError::RefreshFailed(e).into());
            }
        };

        let expires_in = grant.lifetime_seconds();
        let token_type = grant.token_type().to_string();

        // Providers may rotate the refresh token
        let refresh_token = grant.refresh_token.clone().unwrap_or(refresh_token);

        self.commit(CredentialRecord {
            access_token: Some(grant.access_token.clone()),
            refresh_token: Some(refresh_token),
            expires_at: Some(Utc::now() + Duration::seconds(expires_in)),
            token_type: Some(token_type.clone()),
        })
        .await?;

        tracing::info!(expires_in, "Access token refreshed");

        Ok(IssuedToken {
            access_token: grant.access_token,
            token_type,
            expires_in,
        })
    }

    /// Persist, then swap the cache. A failed save leaves the cache as it was.
    async fn commit(&self, record: CredentialRecord) -> Result<()> {
        self.store.save_credentials(&record)?;
        *self.cache.write().await = record;
        Ok(())
    }

    /// Drop the tokens from the cache, then persist the empty record.
    ///
    /// Unlike `commit`, the cache is cleared even when the save fails: a
    /// token the provider just refused must not be handed out again.
    async fn clear_after_failure(&self, token_type: Option<String>) -> Result<()> {
        let cleared = CredentialRecord {
            token_type,
            ..CredentialRecord::default()
        };
        *self.cache.write().await = cleared.clone();
        self.store.save_credentials(&cleared)
    }
}
