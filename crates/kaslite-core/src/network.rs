//! Network parameter set for the Kaspa network family.
//!
//! A closed set of four networks. Network selection controls the address
//! prefix (cashaddr human-readable part) and the default RPC port, plus the
//! maturity depths used to classify UTXOs as confirmed or pending.

use std::fmt;
use std::str::FromStr;

use crate::error::AddressError;

/// Network type: Mainnet, Testnet, Simnet, or Devnet.
///
/// Controls the cashaddr prefix, default RPC port, and maturity depths.
///
/// # Examples
///
/// ```
/// use kaslite_core::network::NetworkType;
/// let net = NetworkType::default();
/// assert_eq!(net, NetworkType::Mainnet);
/// assert_eq!(net.address_prefix(), "kaspa");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum NetworkType {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
    /// Local simulation network.
    Simnet,
    /// Developer network.
    Devnet,
}

impl NetworkType {
    /// Cashaddr prefix for this network.
    ///
    /// # Examples
    ///
    /// ```
    /// use kaslite_core::network::NetworkType;
    /// assert_eq!(NetworkType::Testnet.address_prefix(), "kaspatest");
    /// ```
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Self::Mainnet => "kaspa",
            Self::Testnet => "kaspatest",
            Self::Simnet => "kaspasim",
            Self::Devnet => "kaspadev",
        }
    }

    /// Look up a network from a cashaddr prefix.
    pub fn from_address_prefix(prefix: &str) -> Result<Self, AddressError> {
        match prefix {
            "kaspa" => Ok(Self::Mainnet),
            "kaspatest" => Ok(Self::Testnet),
            "kaspasim" => Ok(Self::Simnet),
            "kaspadev" => Ok(Self::Devnet),
            _ => Err(AddressError::UnknownNetwork(prefix.to_string())),
        }
    }

    /// Default TCP port of the node RPC endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use kaslite_core::network::NetworkType;
    /// assert_eq!(NetworkType::Mainnet.default_rpc_port(), 16110);
    /// assert_eq!(NetworkType::Devnet.default_rpc_port(), 16610);
    /// ```
    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Self::Mainnet => 16110,
            Self::Testnet => 16210,
            Self::Simnet => 16510,
            Self::Devnet => 16610,
        }
    }

    /// Blue-score depth before a coinbase output becomes spendable.
    pub fn coinbase_maturity(&self) -> u64 {
        100
    }

    /// Blue-score depth before a regular output becomes spendable.
    pub fn standard_maturity(&self) -> u64 {
        1
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address_prefix())
    }
}

impl FromStr for NetworkType {
    type Err = AddressError;

    /// Parse a network name. Accepts both cashaddr prefixes (`kaspa`,
    /// `kaspatest`, ...) and the short aliases (`mainnet`, `testnet`,
    /// `simnet`, `devnet`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "simnet" => Ok(Self::Simnet),
            "devnet" => Ok(Self::Devnet),
            other => Self::from_address_prefix(other),
        }
    }
}
