//! Core protocol types: transactions, outpoints, UTXO entries, wire shapes.
//!
//! All monetary values are in sompi (1 KAS = 10^8 sompi). The in-memory
//! [`Transaction`] is what the wallet composes and signs; the `Rpc*` structs
//! are the exact camelCase JSON shapes the node accepts on submission.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::constants::{
    MASS_PER_SCRIPT_PUB_KEY_BYTE, MASS_PER_SIG_OP, MASS_PER_TX_BYTE, SUBNETWORK_ID_LEN,
    SUBNETWORK_ID_NATIVE,
};
use crate::error::TransactionError;

/// A 32-byte transaction identifier.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct TransactionId(pub [u8; 32]);

impl TransactionId {
    /// The zero id (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a TransactionId from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

impl FromStr for TransactionId {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(TransactionError::InvalidTransactionId(s.to_string()));
        }
        let bytes = hex::decode(s)
            .map_err(|_| TransactionError::InvalidTransactionId(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TransactionError::InvalidTransactionId(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl Serialize for TransactionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to a specific output of a previous transaction.
///
/// The `Display` form `"txid:index"` is the canonical outpoint key and the
/// deterministic tiebreak used during UTXO selection.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutpoint {
    /// Transaction ID containing the referenced output.
    pub transaction_id: TransactionId,
    /// Index of the output within the transaction.
    pub index: u32,
}

impl TransactionOutpoint {
    /// Create an outpoint from a transaction id and output index.
    pub fn new(transaction_id: TransactionId, index: u32) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

impl fmt::Display for TransactionOutpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.index)
    }
}

impl FromStr for TransactionOutpoint {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, index) = s
            .split_once(':')
            .ok_or_else(|| TransactionError::InvalidOutpoint(s.to_string()))?;
        Ok(Self {
            transaction_id: txid.parse()?,
            index: index
                .parse()
                .map_err(|_| TransactionError::InvalidOutpoint(s.to_string()))?,
        })
    }
}

/// A versioned script public key locking an output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct ScriptPublicKey {
    /// Script version (currently always 0).
    pub version: u16,
    /// Raw script bytes.
    #[serde(with = "hex_bytes")]
    pub script: Vec<u8>,
}

impl ScriptPublicKey {
    /// The standard pay-to-pubkey script for an address:
    /// `OP_DATA_32 <32-byte x-only key> OP_CHECKSIG`.
    pub fn pay_to_address(address: &Address) -> Self {
        let mut script = Vec::with_capacity(34);
        script.push(0x20);
        script.extend_from_slice(address.payload());
        script.push(0xac);
        Self { version: 0, script }
    }
}

/// An unspent transaction output owned by the wallet.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UtxoEntry {
    /// The outpoint identifying this output.
    pub outpoint: TransactionOutpoint,
    /// The address the output pays to.
    pub address: Address,
    /// Value in sompi.
    pub amount: u64,
    /// The locking script.
    #[serde(rename = "scriptPubKey")]
    pub script_public_key: ScriptPublicKey,
    /// Blue score of the block that accepted this output.
    pub block_blue_score: u64,
    /// Whether the output originates from a coinbase transaction.
    pub is_coinbase: bool,
}

impl UtxoEntry {
    /// Whether the output is spendable at the given virtual blue score.
    ///
    /// An output is mature iff
    /// `blue_score >= block_blue_score + maturity(is_coinbase)`, where the
    /// maturity depth is the deep coinbase depth for coinbase outputs and
    /// the standard depth otherwise.
    pub fn is_mature_at(
        &self,
        blue_score: u64,
        coinbase_maturity: u64,
        standard_maturity: u64,
    ) -> bool {
        let depth = if self.is_coinbase {
            coinbase_maturity
        } else {
            standard_maturity
        };
        blue_score >= self.block_blue_score.saturating_add(depth)
    }
}

/// A transaction input spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TransactionInput {
    /// The outpoint being spent.
    pub previous_outpoint: TransactionOutpoint,
    /// Signature script. Empty until signed.
    pub signature_script: Vec<u8>,
    /// Input sequence number.
    pub sequence: u64,
}

/// A transaction output creating a new UTXO.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TransactionOutput {
    /// Value in sompi.
    pub amount: u64,
    /// The locking script.
    pub script_public_key: ScriptPublicKey,
}

/// A transaction as the wallet composes and signs it.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version.
    pub version: u16,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TransactionInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TransactionOutput>,
    /// Blue score or timestamp before which this tx is invalid.
    pub lock_time: u64,
    /// Subnetwork identifier. Always the native (zeroed) subnetwork here.
    pub subnetwork_id: [u8; SUBNETWORK_ID_LEN],
    /// Optional payload. The wallet never populates it.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    pub fn id(&self) -> Result<TransactionId, TransactionError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| TransactionError::Serialization(e.to_string()))?;
        Ok(TransactionId(blake3::hash(&encoded).into()))
    }

    /// Estimated serialized size in bytes over the wire layout:
    ///
    /// ```text
    /// version (2) || input count (8) ||
    ///   per input: outpoint (32 + 4) || script len (8) || script || sequence (8)
    /// || output count (8) ||
    ///   per output: amount (8) || script version (2) || script len (8) || script
    /// || lock_time (8) || subnetwork_id (20) || gas (8) ||
    ///    payload_hash (32) || payload len (8) || payload
    /// ```
    pub fn estimated_serialized_size(&self) -> u64 {
        let mut size: u64 = 2 + 8;
        for input in &self.inputs {
            size += 32 + 4 + 8 + input.signature_script.len() as u64 + 8;
        }
        size += 8;
        for output in &self.outputs {
            size += 8 + 2 + 8 + output.script_public_key.script.len() as u64;
        }
        size += 8 + SUBNETWORK_ID_LEN as u64 + 8 + 32 + 8 + self.payload.len() as u64;
        size
    }

    /// The mass of this transaction: serialized size weighted per byte,
    /// plus the script-public-key byte weight of all outputs, plus one
    /// signature operation per input.
    pub fn mass(&self) -> u64 {
        let size_mass = self.estimated_serialized_size() * MASS_PER_TX_BYTE;
        let script_mass: u64 = self
            .outputs
            .iter()
            .map(|o| o.script_public_key.script.len() as u64 * MASS_PER_SCRIPT_PUB_KEY_BYTE)
            .sum();
        let sig_op_mass = self.inputs.len() as u64 * MASS_PER_SIG_OP;
        size_mass + script_mass + sig_op_mass
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
    }

    /// Convert to the RPC wire shape carrying the given fee.
    pub fn to_rpc(&self, fee: u64) -> RpcTransaction {
        RpcTransaction {
            version: self.version,
            inputs: self
                .inputs
                .iter()
                .map(|input| RpcTransactionInput {
                    previous_outpoint: RpcOutpoint {
                        transaction_id: input.previous_outpoint.transaction_id.to_string(),
                        index: input.previous_outpoint.index,
                    },
                    signature_script: hex::encode(&input.signature_script),
                    sequence: input.sequence,
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|output| RpcTransactionOutput {
                    amount: output.amount,
                    script_public_key: RpcScriptPublicKey {
                        version: output.script_public_key.version,
                        script_public_key: hex::encode(&output.script_public_key.script),
                    },
                })
                .collect(),
            lock_time: self.lock_time,
            subnetwork_id: hex::encode(SUBNETWORK_ID_NATIVE),
            payload_hash: "0".repeat(64),
            fee,
        }
    }
}

// --- RPC wire shapes ---

/// Wire form of an outpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcOutpoint {
    /// Transaction ID as hex.
    pub transaction_id: String,
    /// Output index.
    pub index: u32,
}

/// Wire form of a transaction input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionInput {
    /// The outpoint being spent.
    pub previous_outpoint: RpcOutpoint,
    /// Signature script as hex.
    pub signature_script: String,
    /// Input sequence number.
    pub sequence: u64,
}

/// Wire form of a script public key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcScriptPublicKey {
    /// Script version.
    pub version: u16,
    /// Script bytes as hex.
    pub script_public_key: String,
}

/// Wire form of a transaction output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransactionOutput {
    /// Value in sompi.
    pub amount: u64,
    /// The locking script.
    pub script_public_key: RpcScriptPublicKey,
}

/// Wire form of a transaction for submission.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    /// Protocol version.
    pub version: u16,
    /// Inputs.
    pub inputs: Vec<RpcTransactionInput>,
    /// Outputs.
    pub outputs: Vec<RpcTransactionOutput>,
    /// Lock time.
    pub lock_time: u64,
    /// Subnetwork identifier: 40 hex zeros for the native subnetwork.
    pub subnetwork_id: String,
    /// Payload hash: 64 hex zeros (no payload).
    pub payload_hash: String,
    /// Fee in sompi.
    pub fee: u64,
}

/// The exact submission payload accepted by the node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubmitTransactionRequest {
    /// The transaction being submitted.
    pub transaction: RpcTransaction,
}

/// Serde adapter serializing byte vectors as hex strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
