//! # kaslite-wallet — HD wallet core for the Kaspa network.
//!
//! Derives spendable addresses from a single seed, maintains a live view
//! of the unspent outputs owned by those addresses, composes and signs
//! outgoing transactions under the chain's mass limits, and keeps the view
//! current through a streaming RPC subscription to a full node.
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`mnemonic`] — BIP-39 phrase generation and parsing
//! - [`keys`] — `KeyChain`, BIP-44 derivation, wallet UID
//! - [`addresses`] — receive/change chains with gap-limit support
//! - [`utxo`] — classified `UtxoSet` with deterministic selection
//! - [`events`] — typed wallet event stream
//! - [`rpc`] — the `RpcApi` trait the wallet consumes
//! - [`store`] — append-only transaction log with pluggable persistence
//! - [`builder`] — composition, fee convergence, Schnorr signing
//! - [`encryption`] — encrypted seed export
//! - [`wallet`] — the `Wallet` orchestrator

pub mod addresses;
pub mod builder;
pub mod encryption;
pub mod error;
pub mod events;
pub mod keys;
pub mod mnemonic;
pub mod rpc;
pub mod store;
pub mod utxo;
pub mod wallet;

// Re-exports for convenient access
pub use addresses::{AddressKind, AddressManager};
pub use builder::{ComposedTransaction, SendRequest, TxBuilder};
pub use encryption::SeedExport;
pub use error::WalletError;
pub use events::{EventEmitter, WalletEvent, WalletReadyInfo};
pub use keys::KeyChain;
pub use rpc::{RpcApi, RpcError, Subscription, UtxosChangedNotification};
pub use store::{FileStorage, RecordStorage, TransactionRecord, TxDirection, TxStore};
pub use utxo::{Balance, UtxoSet};
pub use wallet::{Wallet, WalletOptions};
