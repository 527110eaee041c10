//! Cashaddr address encoding for the Kaspa network family.
//!
//! Addresses use the cashaddr construction: a network prefix, a `:`
//! separator, and a base32 payload carrying a version byte plus a 32-byte
//! x-only public key, terminated by an 8-character BCH checksum computed
//! over the 40-bit cashaddr generator. The checksum commits to the prefix,
//! so an address cannot be replayed across networks:
//! - Mainnet: `kaspa:...`
//! - Testnet: `kaspatest:...`
//! - Simnet: `kaspasim:...`
//! - Devnet: `kaspadev:...`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;
use crate::network::NetworkType;

/// Base32 character set for encoding 5-bit values.
const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Cashaddr BCH generator coefficients (40-bit polymod).
const GENERATOR: [u64; 5] = [
    0x98f2bc8e61,
    0x79b76d99e2,
    0xf33e5fb3c4,
    0xae2eabe2a8,
    0x1e4f43e470,
];

/// Number of base32 characters in the checksum.
const CHECKSUM_LEN: usize = 8;

/// Address version for a Schnorr (x-only) public key payload.
pub const ADDRESS_VERSION_PUBKEY: u8 = 0;

/// A Kaspa network address encoding an x-only public key with cashaddr.
///
/// Human-readable form is `kaspa:...` on mainnet. Internally stores the
/// network, the version byte, and the 32-byte public key payload.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    network: NetworkType,
    version: u8,
    payload: [u8; 32],
}

impl Address {
    /// Create an address from a 32-byte x-only public key and network.
    pub fn from_public_key(payload: [u8; 32], network: NetworkType) -> Self {
        Self {
            network,
            version: ADDRESS_VERSION_PUBKEY,
            payload,
        }
    }

    /// The 32-byte public key payload.
    pub fn payload(&self) -> &[u8; 32] {
        &self.payload
    }

    /// The network this address belongs to.
    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// The address version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Encode this address as a cashaddr string.
    pub fn encode(&self) -> String {
        let prefix = self.network.address_prefix();

        // Pack version byte and payload into one 8-bit stream, then regroup
        // into 5-bit values.
        let mut data8 = Vec::with_capacity(1 + self.payload.len());
        data8.push(self.version);
        data8.extend_from_slice(&self.payload);
        let data5 = convert_bits(&data8, 8, 5, true)
            .expect("8-to-5 regrouping with padding never fails");

        let checksum = create_checksum(prefix, &data5);

        let mut result = String::with_capacity(prefix.len() + 1 + data5.len() + CHECKSUM_LEN);
        result.push_str(prefix);
        result.push(':');
        for &d in data5.iter().chain(checksum.iter()) {
            result.push(CHARSET[d as usize] as char);
        }
        result
    }

    /// Decode a cashaddr string.
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        // Reject mixed case (all alpha chars must share one case)
        let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper {
            return Err(AddressError::MixedCase);
        }

        let s_lower = s.to_ascii_lowercase();

        let sep_pos = s_lower.find(':').ok_or(AddressError::MissingSeparator)?;
        if sep_pos == 0 {
            return Err(AddressError::InvalidPrefix);
        }

        let prefix = &s_lower[..sep_pos];
        let data_part = &s_lower[sep_pos + 1..];

        // Need at least the checksum plus one payload character.
        if data_part.len() <= CHECKSUM_LEN {
            return Err(AddressError::InvalidLength);
        }

        let mut data = Vec::with_capacity(data_part.len());
        for c in data_part.chars() {
            let pos = CHARSET
                .iter()
                .position(|&ch| ch as char == c)
                .ok_or(AddressError::InvalidCharacter(c))?;
            data.push(pos as u8);
        }

        if !verify_checksum(prefix, &data) {
            return Err(AddressError::InvalidChecksum);
        }

        let payload5 = &data[..data.len() - CHECKSUM_LEN];
        let data8 = convert_bits(payload5, 5, 8, false).ok_or(AddressError::InvalidPadding)?;

        if data8.len() != 33 {
            return Err(AddressError::InvalidLength);
        }

        let version = data8[0];
        if version != ADDRESS_VERSION_PUBKEY {
            return Err(AddressError::InvalidVersion(version));
        }

        let network = NetworkType::from_address_prefix(prefix)?;

        let mut payload = [0u8; 32];
        payload.copy_from_slice(&data8[1..]);

        Ok(Self {
            network,
            version,
            payload,
        })
    }

    /// The encoded form without the network prefix and separator.
    pub fn without_prefix(&self) -> String {
        let encoded = self.encode();
        let sep = encoded.find(':').expect("encoded form always has a separator");
        encoded[sep + 1..].to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}

// --- Cashaddr internals ---

/// Compute the cashaddr polymod over a sequence of 5-bit values.
fn polymod(values: &[u8]) -> u64 {
    let mut c: u64 = 1;
    for &d in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ (d as u64);
        for (i, &g) in GENERATOR.iter().enumerate() {
            if (c0 >> i) & 1 != 0 {
                c ^= g;
            }
        }
    }
    c ^ 1
}

/// Expand the prefix for checksum computation: low 5 bits of each
/// character, followed by a zero separator value.
fn prefix_expand(prefix: &str) -> Vec<u8> {
    let mut ret = Vec::with_capacity(prefix.len() + 1);
    for b in prefix.bytes() {
        ret.push(b & 0x1f);
    }
    ret.push(0);
    ret
}

/// Create the 8-value checksum for the given prefix and payload data.
fn create_checksum(prefix: &str, data: &[u8]) -> Vec<u8> {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(data);
    values.extend_from_slice(&[0u8; CHECKSUM_LEN]);
    let pm = polymod(&values);
    (0..CHECKSUM_LEN)
        .map(|i| ((pm >> (5 * (CHECKSUM_LEN - 1 - i))) & 31) as u8)
        .collect()
}

/// Verify the checksum for the given prefix and data (including checksum).
fn verify_checksum(prefix: &str, data: &[u8]) -> bool {
    let mut values = prefix_expand(prefix);
    values.extend_from_slice(data);
    polymod(&values) == 0
}

/// Convert between bit widths (e.g. 8-bit bytes to 5-bit base32 groups).
fn convert_bits(data: &[u8], from_bits: u32, to_bits: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut ret = Vec::new();
    let maxv = (1u32 << to_bits) - 1;
    for &value in data {
        let v = value as u32;
        if v >> from_bits != 0 {
            return None;
        }
        acc = (acc << from_bits) | v;
        bits += from_bits;
        while bits >= to_bits {
            bits -= to_bits;
            ret.push(((acc >> bits) & maxv) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to_bits - bits)) & maxv) as u8);
        }
    } else if bits >= from_bits || ((acc << (to_bits - bits)) & maxv) != 0 {
        return None;
    }
    Some(ret)
}
