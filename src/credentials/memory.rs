//! In-process store, used by tests and by deployments that accept losing
//! credentials on restart.

use super::{CredentialRecord, CredentialStore, PendingStates, StateStore};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    credentials: Mutex<CredentialRecord>,
    states: Mutex<PendingStates>,
    credential_writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `record`, as if written by an earlier process.
    pub fn with_credentials(record: CredentialRecord) -> Self {
        Self {
            credentials: Mutex::new(record),
            ..Self::default()
        }
    }

    /// A store that already holds `states`.
    pub fn with_states(states: PendingStates) -> Self {
        Self {
            states: Mutex::new(states),
            ..Self::default()
        }
    }

    /// Number of successful credential writes so far.
    pub fn credential_writes(&self) -> usize {
        self.credential_writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent save fail, simulating an unavailable disk.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store is read-only"));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    fn load_credentials(&self) -> Result<CredentialRecord> {
        let record = self
            .credentials
            .lock()
            .map_err(|_| anyhow!("credential lock poisoned"))?;
        Ok(record.clone())
    }

    fn save_credentials(&self, record: &CredentialRecord) -> Result<()> {
        self.check_writable()?;
        *self
            .credentials
            .lock()
            .map_err(|_| anyhow!("credential lock poisoned"))? = record.clone();
        self.credential_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl StateStore for MemoryStore {
    fn load_states(&self) -> Result<PendingStates> {
        let states = self
            .states
            .lock()
            .map_err(|_| anyhow!("state lock poisoned"))?;
        Ok(states.clone())
    }

    fn save_states(&self, states: &PendingStates) -> Result<()> {
        self.check_writable()?;
        *self.states.lock().map_err(|_| anyhow!("state lock poisoned"))? = states.clone();
        Ok(())
    }
}
