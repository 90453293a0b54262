//! Durable storage for the Google Ads credential record and pending
//! authorization states.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │   TokenManager       │   │   StateManager       │
//! │  (credential record) │   │  (CSRF states)       │
//! └──────────────────────┘   └──────────────────────┘
//!           ↓ ↑                        ↓ ↑
//!   CredentialStore trait        StateStore trait
//!           ↓ ↑                        ↓ ↑
//! ┌─────────────────────────────────────────────────┐
//! │  JsonFileStore  │  SqliteStore  │  MemoryStore  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Every backend reads and rewrites each document whole. The in-memory
//! copies held by the managers are caches; whatever the store returns at
//! startup is authoritative.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod encryption;
mod file;
mod memory;
mod storage;

pub use encryption::DocumentCipher;
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use storage::SqliteStore;

/// Token scheme used when the provider does not name one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// The singleton credential record for the Google Ads integration.
///
/// An access token without a known `expires_at` is always treated as
/// expired.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub access_token: Option<String>,

    /// Kept across refreshes until explicitly cleared
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub token_type: Option<String>,
}

impl CredentialRecord {
    /// Token scheme, defaulting to "Bearer".
    pub fn token_type(&self) -> &str {
        self.token_type.as_deref().unwrap_or(DEFAULT_TOKEN_TYPE)
    }

    /// Whether the access token must not be presented at `now`.
    ///
    /// Expired when absent, when its expiry is unknown, or when `now` is
    /// within `buffer` of the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => now >= expires_at - buffer,
            _ => true,
        }
    }

    /// Whole seconds until expiry, floored at zero.
    pub fn expires_in_seconds_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - now).num_seconds().max(0))
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Pending CSRF states, keyed by state token, valued by creation time.
pub type PendingStates = HashMap<String, DateTime<Utc>>;

/// Durable home of the credential record.
pub trait CredentialStore: Send + Sync {
    /// Read the whole record; an absent record reads as empty.
    fn load_credentials(&self) -> Result<CredentialRecord>;

    /// Replace the whole record atomically.
    fn save_credentials(&self, record: &CredentialRecord) -> Result<()>;
}

/// Durable home of the pending CSRF states.
pub trait StateStore: Send + Sync {
    /// Read every pending state; an absent document reads as empty.
    fn load_states(&self) -> Result<PendingStates>;

    /// Replace the whole state set atomically.
    fn save_states(&self, states: &PendingStates) -> Result<()>;
}
