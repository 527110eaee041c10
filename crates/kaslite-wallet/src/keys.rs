//! HD key derivation on the fixed BIP-44 path family.
//!
//! The keychain derives every key from a BIP-39 seed along
//! `m/44'/972'/0'/<chain>/<index>` where chain `0'` is the receive chain
//! and chain `1'` is the change chain (hardened chain nodes, non-hardened
//! leaf indices). A separate hardened leaf `m/44'/972'/0'/1'/0'` derives
//! the wallet UID: a stable blake3-based fingerprint of that address with
//! the network prefix stripped, identifying the wallet across restarts.
//!
//! Secret material never leaves this module in plaintext: signing consumers
//! receive per-input Schnorr signing keys on demand, and the seed phrase is
//! only surfaced by the explicit export path.

use std::collections::HashMap;
use std::fmt;

use bip32::{ChildNumber, Prefix, XPrv};
use k256::schnorr::SigningKey;
use zeroize::Zeroizing;

use kaslite_core::{Address, NetworkType};

use crate::addresses::AddressKind;
use crate::error::WalletError;
use crate::mnemonic;

/// BIP-44 purpose level.
const PURPOSE: u32 = 44;

/// Registered coin type of the Kaspa network family.
const COIN_TYPE: u32 = 972;

/// Account level. A single account is assumed.
const ACCOUNT: u32 = 0;

/// Length of the UID fingerprint in bytes (rendered as hex).
const UID_LEN: usize = 8;

/// A derived address together with its chain position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    /// Leaf index on the chain.
    pub index: u32,
    /// Which chain the address belongs to.
    pub kind: AddressKind,
    /// The encoded address.
    pub address: Address,
}

/// Deterministic key derivation chain from a BIP-39 phrase.
///
/// Holds the master and per-chain extended private keys and a reverse
/// lookup from derived addresses to their chain position, so signing keys
/// can be recovered for any address the wallet has produced.
pub struct KeyChain {
    phrase: String,
    master: XPrv,
    receive: XPrv,
    change: XPrv,
    network: NetworkType,
    uid: String,
    /// Reverse lookup: address -> (chain, leaf index).
    address_index: HashMap<Address, (AddressKind, u32)>,
}

impl KeyChain {
    /// Build a keychain from a mnemonic phrase.
    pub fn from_phrase(phrase: &str, network: NetworkType) -> Result<Self, WalletError> {
        let normalized = mnemonic::normalize_phrase(phrase)?;
        let seed = Zeroizing::new(mnemonic::phrase_to_seed(&normalized)?);

        let master =
            XPrv::new(&seed[..]).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

        let account = [PURPOSE, COIN_TYPE, ACCOUNT]
            .iter()
            .try_fold(master.clone(), |key, &level| {
                key.derive_child(hardened(level)?)
                    .map_err(|e| WalletError::KeyDerivation(e.to_string()))
            })?;

        let receive = account
            .derive_child(hardened(AddressKind::Receive.chain_index())?)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let change = account
            .derive_child(hardened(AddressKind::Change.chain_index())?)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

        // UID: the hardened leaf 0' on the change chain, hashed with the
        // network prefix stripped.
        let uid_xprv = change
            .derive_child(hardened(0)?)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let uid_address = address_for(&uid_xprv, network)?;
        let digest = blake3::hash(uid_address.without_prefix().as_bytes());
        let uid = hex::encode(&digest.as_bytes()[..UID_LEN]);

        Ok(Self {
            phrase: normalized,
            master,
            receive,
            change,
            network,
            uid,
            address_index: HashMap::new(),
        })
    }

    /// Derive the address at `(kind, index)`, recording it for reverse
    /// lookup.
    pub fn derive_address(
        &mut self,
        kind: AddressKind,
        index: u32,
    ) -> Result<DerivedAddress, WalletError> {
        let xprv = self.leaf_xprv(kind, index)?;
        let address = address_for(&xprv, self.network)?;
        self.address_index.insert(address.clone(), (kind, index));
        Ok(DerivedAddress {
            index,
            kind,
            address,
        })
    }

    /// Look up the chain position of a previously derived address.
    pub fn position_of(&self, address: &Address) -> Option<(AddressKind, u32)> {
        self.address_index.get(address).copied()
    }

    /// Produce the Schnorr signing key for a previously derived address.
    ///
    /// Returns `None` if the address was never derived by this keychain.
    pub fn signing_key_for_address(&self, address: &Address) -> Option<SigningKey> {
        let (kind, index) = self.position_of(address)?;
        let xprv = self.leaf_xprv(kind, index).ok()?;
        signing_key(&xprv).ok()
    }

    /// The normalized mnemonic phrase backing this keychain.
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// The master extended private key in its standard string encoding.
    pub fn master_xprv_string(&self) -> String {
        self.master.to_string(Prefix::XPRV).to_string()
    }

    /// The network this keychain derives addresses for.
    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// The stable wallet identifier.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    fn leaf_xprv(&self, kind: AddressKind, index: u32) -> Result<XPrv, WalletError> {
        let chain = match kind {
            AddressKind::Receive => &self.receive,
            AddressKind::Change => &self.change,
        };
        let child = ChildNumber::new(index, false)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        chain
            .derive_child(child)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("network", &self.network)
            .field("uid", &self.uid)
            .field("derived", &self.address_index.len())
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// Hardened child number for an index.
fn hardened(index: u32) -> Result<ChildNumber, WalletError> {
    ChildNumber::new(index, true).map_err(|e| WalletError::KeyDerivation(e.to_string()))
}

/// The Schnorr signing key of a leaf extended private key.
fn signing_key(xprv: &XPrv) -> Result<SigningKey, WalletError> {
    SigningKey::from_bytes(xprv.private_key().to_bytes().as_slice())
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))
}

/// The address of a leaf extended private key: the x-only public key under
/// cashaddr.
fn address_for(xprv: &XPrv, network: NetworkType) -> Result<Address, WalletError> {
    let key = signing_key(xprv)?;
    let payload: [u8; 32] = key.verifying_key().to_bytes().into();
    Ok(Address::from_public_key(payload, network))
}
