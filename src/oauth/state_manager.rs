//! OAuth state management for CSRF protection.
//!
//! Pending state tokens live in memory and are written through to a durable
//! [`StateStore`] on every change, so an authorization started before a
//! restart can still complete after it.

use crate::credentials::{PendingStates, StateStore};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Random bytes per state token (256 bits, rendered as 64 hex chars)
const STATE_BYTES: usize = 32;

/// Diagnostic view of a pending state
#[derive(Clone, Debug)]
pub struct PendingState {
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

/// OAuth state manager with expiration and durable write-through
#[derive(Clone)]
pub struct StateManager {
    states: Arc<Mutex<PendingStates>>,
    /// States consumed by this process, keyed by consumption time. Kept for
    /// one TTL so a copy still in the durable store cannot be replayed.
    consumed: Arc<Mutex<PendingStates>>,
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl StateManager {
    /// Load pending states from `store`, dropping any already past `ttl_seconds`.
    pub fn load(store: Arc<dyn StateStore>, ttl_seconds: i64) -> Result<Self> {
        Self::load_at(store, ttl_seconds, Utc::now())
    }

    pub(crate) fn load_at(
        store: Arc<dyn StateStore>,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let ttl = Duration::seconds(ttl_seconds);
        let mut states = store.load_states()?;

        let before = states.len();
        states.retain(|_, created_at| now - *created_at < ttl);
        if states.len() != before {
            store.save_states(&states)?;
        }

        tracing::debug!(pending = states.len(), "Loaded OAuth states");

        Ok(Self {
            states: Arc::new(Mutex::new(states)),
            consumed: Arc::new(Mutex::new(PendingStates::new())),
            store,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a new state token and record it.
    pub async fn create_state(&self) -> Result<String> {
        self.create_state_at(Utc::now()).await
    }

    pub(crate) async fn create_state_at(&self, now: DateTime<Utc>) -> Result<String> {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let state = hex::encode(bytes);

        let mut states = self.states.lock().await;
        states.insert(state.clone(), now);

        if let Err(e) = self.store.save_states(&states) {
            states.remove(&state);
            return Err(e);
        }

        Ok(state)
    }

    /// Validate and consume a state token.
    ///
    /// Returns true only if the state was pending and younger than the TTL.
    /// A matching entry is removed whether or not it had expired, so a state
    /// can never be presented twice.
    pub async fn validate_and_consume(&self, state: &str) -> Result<bool> {
        self.validate_and_consume_at(state, Utc::now()).await
    }

    pub(crate) async fn validate_and_consume_at(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut states = self.states.lock().await;
        let mut consumed = self.consumed.lock().await;

        if consumed.contains_key(state) {
            tracing::warn!("OAuth state presented again after being consumed");
            return Ok(false);
        }

        let created_at = match states.remove(state) {
            Some(created_at) => created_at,
            None => {
                // Another process sharing the store may have issued it
                let mut durable = self.store.load_states()?;
                match durable.remove(state) {
                    Some(created_at) => {
                        tracing::info!("OAuth state found in durable store, restoring");
                        states.extend(durable);
                        created_at
                    }
                    None => return Ok(false),
                }
            }
        };

        // Recorded before the save so a failed write cannot revive the state
        consumed.insert(state.to_string(), now);
        self.store.save_states(&states)?;

        Ok(now - created_at < self.ttl)
    }

    /// Drop every state older than the TTL. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        self.cleanup_expired_at(Utc::now()).await
    }

    pub(crate) async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut states = self.states.lock().await;
        let before = states.len();

        states.retain(|_, created_at| now - *created_at < self.ttl);
        self.consumed
            .lock()
            .await
            .retain(|_, consumed_at| now - *consumed_at < self.ttl);

        let removed = before - states.len();
        if removed > 0 {
            self.store.save_states(&states)?;
        }

        Ok(removed)
    }

    /// Forget every pending state, in memory and on disk.
    pub async fn clear(&self) -> Result<()> {
        let mut states = self.states.lock().await;
        states.clear();
        self.store.save_states(&states)
    }

    /// Get count of active states (for debugging/monitoring)
    pub async fn count(&self) -> usize {
        self.states.lock().await.len()
    }

    /// Pending states, oldest first.
    pub async fn pending(&self) -> Vec<PendingState> {
        let now = Utc::now();
        let states = self.states.lock().await;

        let mut pending: Vec<PendingState> = states
            .iter()
            .map(|(state, created_at)| PendingState {
                state: state.clone(),
                created_at: *created_at,
                expires_in_seconds: (self.ttl - (now - *created_at)).num_seconds().max(0),
            })
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }
}

/// Background task to periodically clean up expired states
pub async fn run_state_cleanup(manager: StateManager, interval_seconds: u64) {
    // tokio panics on a zero period
    let period = tokio::time::Duration::from_secs(interval_seconds.max(1));
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;
        match manager.cleanup_expired().await {
            Ok(removed) => {
                let remaining = manager.count().await;
                tracing::debug!(removed, remaining, "OAuth state cleanup complete")
            }
            Err(e) => tracing::error!(error = %e, "OAuth state cleanup failed"),
        }
    }
}
