//! Protocol constants. All monetary values in sompi (1 KAS = 10^8 sompi).

pub const SOMPI_PER_KAS: u64 = 100_000_000;

/// Mass contribution of every serialized transaction byte.
pub const MASS_PER_TX_BYTE: u64 = 1;

/// Mass contribution of every script-public-key byte across all outputs.
pub const MASS_PER_SCRIPT_PUB_KEY_BYTE: u64 = 10;

/// Mass contribution of every signature operation (one per signed input).
pub const MASS_PER_SIG_OP: u64 = 1000;

/// Hard mass ceiling a block will accept for a single transaction.
pub const MAX_MASS_ACCEPTED_BY_BLOCK: u64 = 10_000_000;

/// Mass of a blank two-output transaction before any inputs are attached:
/// the fixed header/output skeleton measured by
/// [`Transaction::estimated_serialized_size`](crate::types::Transaction::estimated_serialized_size)
/// plus the script-public-key weight of two standard pay-to-pubkey outputs.
pub const ESTIMATED_STANDALONE_MASS_WITHOUT_INPUTS: u64 = 878;

/// Estimated mass of one signed pay-to-pubkey input: serialized input bytes
/// (outpoint, script length prefix, 66-byte signature script, sequence)
/// plus one signature operation.
pub const ESTIMATED_MASS_PER_INPUT: u64 = 118 * MASS_PER_TX_BYTE + MASS_PER_SIG_OP;

/// Mass budget left for inputs once the standalone skeleton is accounted for.
pub const MAX_MASS_UTXOS: u64 =
    MAX_MASS_ACCEPTED_BY_BLOCK - ESTIMATED_STANDALONE_MASS_WITHOUT_INPUTS;

/// Default network fee rate in sompi per serialized byte.
pub const DEFAULT_FEE_PER_BYTE: u64 = 1;

/// Default gap limit for HD address discovery.
pub const DEFAULT_GAP_LIMIT: u32 = 64;

/// Transaction version emitted by the wallet.
pub const TX_VERSION: u16 = 0;

/// Sequence value set on every wallet-built input.
pub const DEFAULT_SEQUENCE: u64 = 0;

/// Length in bytes of a subnetwork identifier.
pub const SUBNETWORK_ID_LEN: usize = 20;

/// The native subnetwork: all-zero identifier.
pub const SUBNETWORK_ID_NATIVE: [u8; SUBNETWORK_ID_LEN] = [0u8; SUBNETWORK_ID_LEN];
