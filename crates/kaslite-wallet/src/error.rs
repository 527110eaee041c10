//! Wallet error types.

use kaslite_core::error::{AddressError, TransactionError};
use thiserror::Error;

use crate::rpc::RpcError;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Insufficient confirmed funds to cover the amount plus fees.
    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds {
        /// Spendable confirmed balance in sompi.
        available: u64,
        /// Required amount in sompi.
        required: u64,
    },

    /// No confirmed UTXOs available for spending.
    #[error("no UTXOs available")]
    NoUtxos,

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The computed fee exceeds the configured network fee ceiling.
    #[error("network fee limit exceeded: fee {fee} > max {max}")]
    FeeLimitExceeded {
        /// Computed fee in sompi.
        fee: u64,
        /// Configured ceiling in sompi.
        max: u64,
    },

    /// Automatic fee calculation is disabled and the supplied fee does not
    /// cover the transaction size.
    #[error("minimum fee required is {required}")]
    MinimumFeeRequired {
        /// Minimum acceptable fee in sompi.
        required: u64,
    },

    /// The iterative fee estimate failed to converge.
    #[error("fee estimation did not converge after {0} rounds")]
    FeeEstimateDiverged(usize),

    /// Transaction mass exceeds what a block will accept.
    #[error("transaction mass {mass} exceeds limit {max}")]
    MassExceeded {
        /// Computed mass.
        mass: u64,
        /// Acceptance limit.
        max: u64,
    },

    /// The selected inputs do not cover outputs plus fee.
    #[error("change underflow: inputs {inputs} < amount {amount} + fee {fee}")]
    ChangeUnderflow {
        /// Total input value in sompi.
        inputs: u64,
        /// Recipient amount in sompi.
        amount: u64,
        /// Fee in sompi.
        fee: u64,
    },

    /// A continuous sync is already running.
    #[error("sync already in progress")]
    SyncInProgress,

    /// Required signing key not found for an input address.
    #[error("signing key not found for {0}")]
    KeyNotFound(String),

    /// Key derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Wrong password for an encrypted seed export.
    #[error("invalid password")]
    InvalidPassword,

    /// Encrypted or persisted data is corrupted or has invalid format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// Encryption failure.
    #[error("encryption: {0}")]
    Encryption(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// RPC failure surfaced from the node client.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// Address codec error from kaslite-core.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Transaction error from kaslite-core.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = WalletError::InsufficientFunds {
            available: 100,
            required: 200,
        };
        assert_eq!(
            e.to_string(),
            "insufficient funds: available 100, required 200"
        );
    }

    #[test]
    fn display_minimum_fee() {
        let e = WalletError::MinimumFeeRequired { required: 400 };
        assert_eq!(e.to_string(), "minimum fee required is 400");
    }

    #[test]
    fn display_sync_in_progress() {
        assert_eq!(
            WalletError::SyncInProgress.to_string(),
            "sync already in progress"
        );
    }

    #[test]
    fn from_rpc_error() {
        let rpc = RpcError::NotConnected;
        let wallet: WalletError = rpc.into();
        assert_eq!(wallet, WalletError::Rpc(RpcError::NotConnected));
    }

    #[test]
    fn from_address_error() {
        let err = AddressError::InvalidChecksum;
        let wallet: WalletError = err.into();
        assert_eq!(wallet, WalletError::Address(AddressError::InvalidChecksum));
    }

    #[test]
    fn clone_and_eq() {
        let e1 = WalletError::InvalidAmount("zero".into());
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }
}
