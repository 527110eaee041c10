//! BIP-39 mnemonic backup for the wallet seed.

use bip39::{Language, Mnemonic};

use crate::error::WalletError;

/// Generate a fresh 12-word mnemonic from 16 bytes of OS entropy.
pub fn generate_phrase() -> String {
    use rand::RngCore;
    let mut entropy = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let m = Mnemonic::from_entropy_in(Language::English, &entropy)
        .expect("16 bytes always produces a valid mnemonic");
    m.to_string()
}

/// Parse a BIP-39 mnemonic phrase into the 64-byte derivation seed.
///
/// Normalizes whitespace and converts to lowercase before parsing. The
/// passphrase is fixed to the empty string.
pub fn phrase_to_seed(phrase: &str) -> Result<[u8; 64], WalletError> {
    Ok(parse_phrase(phrase)?.to_seed(""))
}

/// Parse and validate a mnemonic phrase, returning its normalized form.
pub fn normalize_phrase(phrase: &str) -> Result<String, WalletError> {
    Ok(parse_phrase(phrase)?.to_string())
}

fn parse_phrase(phrase: &str) -> Result<Mnemonic, WalletError> {
    let normalized = phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}
