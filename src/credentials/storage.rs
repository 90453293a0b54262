//! Encrypted document storage using SQLite.
//!
//! Holds the credential record and the pending state set as two named
//! documents, each sealed with AES-256-GCM before it touches disk.

use super::encryption::{DocumentCipher, Sealed};
use super::{CredentialRecord, CredentialStore, PendingStates, StateStore};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CREDENTIALS_DOCUMENT: &str = "credentials";
const STATES_DOCUMENT: &str = "oauth_states";

/// Encrypted document storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE documents (
///     name TEXT PRIMARY KEY,        -- "credentials" | "oauth_states"
///     payload TEXT NOT NULL,        -- Encrypted JSON document
///     nonce TEXT NOT NULL,          -- Nonce for payload
///     updated_at TEXT NOT NULL      -- ISO 8601 timestamp
/// );
/// ```
///
/// Each save is a single-row upsert, so a document is always replaced
/// whole.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    cipher: DocumentCipher,
}

impl SqliteStore {
    /// Creates or opens a document store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (or `:memory:`)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher = DocumentCipher::from_base64(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                nonce TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create documents table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }

    fn read_document<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT payload, nonce FROM documents WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context(|| format!("Failed to read document '{}'", name))?;

        let Some((ciphertext, nonce)) = row else {
            return Ok(T::default());
        };

        let json = self
            .cipher
            .open(&Sealed { ciphertext, nonce })
            .with_context(|| format!("Failed to decrypt document '{}'", name))?;

        serde_json::from_str(&json).with_context(|| format!("Failed to parse document '{}'", name))
    }

    fn write_document<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize document")?;
        let sealed = self.cipher.seal(&json)?;
        let now = Utc::now().to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO documents (name, payload, nonce, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(name) DO UPDATE SET
                    payload = excluded.payload,
                    nonce = excluded.nonce,
                    updated_at = excluded.updated_at
                "#,
                params![name, sealed.ciphertext, sealed.nonce, now],
            )
            .with_context(|| format!("Failed to store document '{}'", name))?;

        Ok(())
    }
}

impl CredentialStore for SqliteStore {
    fn load_credentials(&self) -> Result<CredentialRecord> {
        self.read_document(CREDENTIALS_DOCUMENT)
    }

    fn save_credentials(&self, record: &CredentialRecord) -> Result<()> {
        self.write_document(CREDENTIALS_DOCUMENT, record)
    }
}

impl StateStore for SqliteStore {
    fn load_states(&self) -> Result<PendingStates> {
        self.read_document(STATES_DOCUMENT)
    }

    fn save_states(&self, states: &PendingStates) -> Result<()> {
        self.write_document(STATES_DOCUMENT, states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use chrono::Duration;

    fn test_key(byte: u8) -> String {
        BASE64.encode([byte; 32])
    }

    fn create_test_store() -> SqliteStore {
        SqliteStore::new(":memory:", &test_key(0)).expect("Failed to create test store")
    }

    fn create_test_record() -> CredentialRecord {
        CredentialRecord {
            access_token: Some("ya29.access-12345".to_string()),
            refresh_token: Some("1//refresh-67890".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_empty_database_reads_as_empty() {
        let store = create_test_store();
        assert_eq!(store.load_credentials().unwrap(), CredentialRecord::default());
        assert!(store.load_states().unwrap().is_empty());
    }

    #[test]
    fn test_store_and_load_credentials() {
        let store = create_test_store();
        let record = create_test_record();

        store.save_credentials(&record).unwrap();
        assert_eq!(store.load_credentials().unwrap(), record);
    }

    #[test]
    fn test_save_replaces_whole_record() {
        let store = create_test_store();
        store.save_credentials(&create_test_record()).unwrap();

        let cleared = CredentialRecord::default();
        store.save_credentials(&cleared).unwrap();

        assert_eq!(store.load_credentials().unwrap(), cleared);
    }

    #[test]
    fn test_documents_are_independent() {
        let store = create_test_store();
        let mut states = PendingStates::new();
        states.insert("deadbeef".to_string(), Utc::now());

        store.save_credentials(&create_test_record()).unwrap();
        store.save_states(&states).unwrap();

        assert_eq!(store.load_states().unwrap().len(), 1);
        assert!(store.load_credentials().unwrap().access_token.is_some());
    }

    #[test]
    fn test_payload_is_encrypted_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let store = SqliteStore::new(&path, &test_key(0)).unwrap();
        store.save_credentials(&create_test_record()).unwrap();

        let conn = Connection::open(&path).unwrap();
        let payload: String = conn
            .query_row(
                "SELECT payload FROM documents WHERE name = 'credentials'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(!payload.contains("ya29"));

        // A different key cannot open it
        let other = SqliteStore::new(&path, &test_key(1)).unwrap();
        assert!(other.load_credentials().is_err());
    }

    #[test]
    fn test_invalid_encryption_key() {
        assert!(SqliteStore::new(":memory:", "short").is_err());
        assert!(SqliteStore::new(":memory:", "not-valid-base64!@#$").is_err());
    }
}
