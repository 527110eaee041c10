//! Error types for the kaslite protocol layer.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing ':' separator")] MissingSeparator,
    #[error("invalid prefix")] InvalidPrefix,
    #[error("invalid length")] InvalidLength,
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid version: {0}")] InvalidVersion(u8),
    #[error("invalid padding bits")] InvalidPadding,
    #[error("unknown network: {0}")] UnknownNetwork(String),
    #[error("mixed case")] MixedCase,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("empty inputs or outputs")] EmptyInputsOrOutputs,
    #[error("value overflow")] ValueOverflow,
    #[error("invalid transaction id: {0}")] InvalidTransactionId(String),
    #[error("invalid outpoint: {0}")] InvalidOutpoint(String),
    #[error("serialization: {0}")] Serialization(String),
}
