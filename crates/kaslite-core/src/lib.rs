//! # kaslite-core — protocol building blocks for the kaslite wallet.
//!
//! Provides the network parameter set, the cashaddr address codec,
//! transaction and UTXO types with mass/size arithmetic, and the RPC wire
//! shapes shared by every consumer of the wallet core.
//!
//! # Modules
//!
//! - [`error`] — `AddressError` and `TransactionError` enums
//! - [`network`] — `NetworkType`, prefixes, ports, maturity depths
//! - [`address`] — cashaddr encoding/decoding, typed `Address`
//! - [`constants`] — denomination, mass, and fee constants
//! - [`types`] — transactions, outpoints, UTXO entries, wire shapes

pub mod address;
pub mod constants;
pub mod error;
pub mod network;
pub mod types;

// Re-exports for convenient access
pub use address::Address;
pub use error::{AddressError, TransactionError};
pub use network::NetworkType;
pub use types::{
    RpcTransaction, ScriptPublicKey, SubmitTransactionRequest, Transaction, TransactionId,
    TransactionInput, TransactionOutpoint, TransactionOutput, UtxoEntry,
};
