//! File-backed stores: one pretty-printed JSON document per file.

use super::{CredentialRecord, CredentialStore, PendingStates, StateStore};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single JSON document on disk.
///
/// Writes go to a `.tmp` sibling, are fsynced, then renamed over the
/// target, so readers never observe a partially written document.
struct JsonDocument {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonDocument {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn read<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if !self.path.exists() {
            return Ok(T::default());
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        if json.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("Failed to serialize document")?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Document write lock poisoned"))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path).context("Failed to create temporary file")?;
            file.write_all(json.as_bytes())
                .context("Failed to write document")?;
            file.sync_all().context("Failed to sync document to disk")?;
        }

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }

    fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        }
        Ok(())
    }
}

/// Credential record and pending states kept in two JSON files.
pub struct JsonFileStore {
    credentials: JsonDocument,
    states: JsonDocument,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(credentials_path: P, states_path: Q) -> Self {
        Self {
            credentials: JsonDocument::new(credentials_path.as_ref().to_path_buf()),
            states: JsonDocument::new(states_path.as_ref().to_path_buf()),
        }
    }
}

impl CredentialStore for JsonFileStore {
    fn load_credentials(&self) -> Result<CredentialRecord> {
        self.credentials.read()
    }

    fn save_credentials(&self, record: &CredentialRecord) -> Result<()> {
        self.credentials.write(record)
    }
}

impl StateStore for JsonFileStore {
    fn load_states(&self) -> Result<PendingStates> {
        self.states.read()
    }

    fn save_states(&self, states: &PendingStates) -> Result<()> {
        // An empty set leaves no file behind
        if states.is_empty() {
            return self.states.remove();
        }
        self.states.write(states)
    }
}
