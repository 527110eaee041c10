//! Encrypted seed export.
//!
//! The only durable secret this wallet produces is the export blob: the
//! JSON `{ privKey, seedPhrase }` payload encrypted with AES-256-GCM under
//! a password-derived key (BLAKE3 KDF over password and salt).
//!
//! # Wire format
//! ```text
//! salt (32 bytes) || nonce (12 bytes) || ciphertext + auth_tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// BLAKE3 KDF context for password-derived export keys.
const EXPORT_KDF_CONTEXT: &str = "kaslite-seed-export-kdf-v1";

/// Salt length in bytes.
const SALT_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Minimum ciphertext blob size (salt + nonce + auth tag).
const MIN_ENCRYPTED_LEN: usize = SALT_LEN + NONCE_LEN + 16;

/// The plaintext export payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedExport {
    /// The master extended private key string.
    #[serde(rename = "privKey")]
    pub priv_key: String,
    /// The BIP-39 mnemonic phrase.
    #[serde(rename = "seedPhrase")]
    pub seed_phrase: String,
}

/// Derive a 256-bit key from a password and salt using BLAKE3.
fn derive_key(password: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(password.len() + salt.len());
    ikm.extend_from_slice(password);
    ikm.extend_from_slice(salt);
    blake3::derive_key(EXPORT_KDF_CONTEXT, &ikm)
}

/// Encrypt an export payload with a password.
///
/// Generates a random salt and nonce; returns `salt || nonce ||
/// ciphertext+tag`.
pub fn encrypt_export(export: &SeedExport, password: &[u8]) -> Result<Vec<u8>, WalletError> {
    let plaintext =
        serde_json::to_vec(export).map_err(|e| WalletError::Serialization(e.to_string()))?;
    encrypt(&plaintext, password)
}

/// Decrypt an export payload previously produced by [`encrypt_export`].
pub fn decrypt_export(encrypted: &[u8], password: &[u8]) -> Result<SeedExport, WalletError> {
    let plaintext = decrypt(encrypted, password)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| WalletError::CorruptedData(format!("export payload: {e}")))
}

/// Encrypt raw bytes with a password.
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt);
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| WalletError::Encryption(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt bytes produced by [`encrypt`]. A wrong password surfaces as
/// [`WalletError::InvalidPassword`] (authentication tag mismatch).
pub fn decrypt(encrypted: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < MIN_ENCRYPTED_LEN {
        return Err(WalletError::CorruptedData(format!(
            "encrypted blob too short: {} < {MIN_ENCRYPTED_LEN}",
            encrypted.len()
        )));
    }

    let salt = &encrypted[..SALT_LEN];
    let nonce_bytes = &encrypted[SALT_LEN..SALT_LEN + NONCE_LEN];
    let ciphertext = &encrypted[SALT_LEN + NONCE_LEN..];

    let key = derive_key(password, salt);
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| WalletError::Encryption(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| WalletError::InvalidPassword)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_export() -> SeedExport {
        SeedExport {
            priv_key: "xprv9s21ZrQH143K2example".to_string(),
            seed_phrase: "legal winner thank year wave sausage worth useful legal winner thank yellow".to_string(),
        }
    }

    #[test]
    fn export_roundtrip() {
        let export = sample_export();
        let blob = encrypt_export(&export, b"hunter2").unwrap();
        let back = decrypt_export(&blob, b"hunter2").unwrap();
        assert_eq!(back, export);
    }

    #[test]
    fn export_json_field_names() {
        let json = serde_json::to_string(&sample_export()).unwrap();
        assert!(json.contains("\"privKey\""));
        assert!(json.contains("\"seedPhrase\""));
    }

    #[test]
    fn wrong_password_fails() {
        let blob = encrypt_export(&sample_export(), b"correct").unwrap();
        let err = decrypt_export(&blob, b"wrong").unwrap_err();
        assert_eq!(err, WalletError::InvalidPassword);
    }

    #[test]
    fn ciphertext_differs_per_encryption() {
        let export = sample_export();
        let blob1 = encrypt_export(&export, b"pw").unwrap();
        let blob2 = encrypt_export(&export, b"pw").unwrap();
        // Fresh salt and nonce every time.
        assert_ne!(blob1, blob2);
    }

    #[test]
    fn truncated_blob_fails() {
        let err = decrypt(&[0u8; 10], b"pw").unwrap_err();
        assert!(matches!(err, WalletError::CorruptedData(_)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let mut blob = encrypt(b"payload", b"pw").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert_eq!(decrypt(&blob, b"pw").unwrap_err(), WalletError::InvalidPassword);
    }

    #[test]
    fn tampered_salt_fails() {
        let mut blob = encrypt(b"payload", b"pw").unwrap();
        blob[0] ^= 0xFF;
        assert_eq!(decrypt(&blob, b"pw").unwrap_err(), WalletError::InvalidPassword);
    }

    #[test]
    fn derive_key_depends_on_both_inputs() {
        let base = derive_key(b"pw", b"salt");
        assert_eq!(base, derive_key(b"pw", b"salt"));
        assert_ne!(base, derive_key(b"pw2", b"salt"));
        assert_ne!(base, derive_key(b"pw", b"salt2"));
    }

    #[test]
    fn overhead_is_salt_nonce_tag() {
        let blob = encrypt(b"hello", b"pw").unwrap();
        assert_eq!(blob.len(), SALT_LEN + NONCE_LEN + 5 + 16);
    }
}
