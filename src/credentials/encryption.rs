//! AES-256-GCM sealing of stored documents.
//!
//! Each write seals the whole serialized document under a fresh nonce.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// A sealed document: base64 ciphertext plus the base64 nonce it was sealed with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub nonce: String,
}

/// Seals and opens documents with a single master key.
pub struct DocumentCipher {
    cipher: Aes256Gcm,
}

impl DocumentCipher {
    /// Build a cipher from a base64-encoded 32-byte key.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64.trim())
            .context("Failed to decode base64 encryption key")?;

        if key_bytes.len() != KEY_SIZE {
            return Err(anyhow!(
                "Encryption key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            ));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &str) -> Result<Sealed> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {}", e))?;

        Ok(Sealed {
            ciphertext: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce),
        })
    }

    /// Decrypt a sealed document. Fails on a wrong key or any tampering.
    pub fn open(&self, sealed: &Sealed) -> Result<String> {
        let ciphertext = BASE64
            .decode(&sealed.ciphertext)
            .context("Failed to decode ciphertext")?;
        let nonce_bytes = BASE64
            .decode(&sealed.nonce)
            .context("Failed to decode nonce")?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(anyhow!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            ));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

        String::from_utf8(plaintext).context("Decrypted document is not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher(byte: u8) -> DocumentCipher {
        DocumentCipher::from_base64(&BASE64.encode([byte; 32])).unwrap()
    }

    #[test]
    fn test_key_validation() {
        assert!(DocumentCipher::from_base64(&BASE64.encode([0u8; 32])).is_ok());
        assert!(DocumentCipher::from_base64(&BASE64.encode([0u8; 16])).is_err());
        assert!(DocumentCipher::from_base64(&BASE64.encode([0u8; 64])).is_err());
        assert!(DocumentCipher::from_base64("not-valid-base64!@#$").is_err());
    }

    #[test]
    fn test_seal_and_open() {
        let cipher = test_cipher(0);
        let document = r#"{"refresh_token":"1//secret"}"#;

        let sealed = cipher.seal(document).unwrap();
        assert!(!sealed.ciphertext.contains("secret"));
        assert_eq!(cipher.open(&sealed).unwrap(), document);
    }

    #[test]
    fn test_fresh_nonce_per_seal() {
        let cipher = test_cipher(0);
        let a = cipher.seal("same").unwrap();
        let b = cipher.seal("same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = test_cipher(0).seal("secret").unwrap();
        assert!(test_cipher(1).open(&sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = test_cipher(0);
        let mut sealed = cipher.seal("secret").unwrap();
        sealed.ciphertext.push('X');
        assert!(cipher.open(&sealed).is_err());
    }
}
