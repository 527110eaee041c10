//! Transaction composition, fee estimation, and signing.
//!
//! Composition selects confirmed UTXOs, derives a change address from the
//! change chain (rolling the reservation back on failure so the index is
//! not burned), assembles the transaction, and signs each input with
//! Schnorr over a SIGHASH_ALL digest.
//!
//! # Signing scheme
//!
//! Each input is signed over a **sighash** that commits to:
//! - Transaction version, lock time, and subnetwork id
//! - All input outpoints and sequences
//! - All outputs (amount, script version, script bytes)
//! - The index of the input being signed and the output it spends
//!
//! Signature scripts are excluded from the sighash so inputs can be signed
//! independently in any order. BIP-340 auxiliary randomness is fixed to
//! zero, making signatures (and therefore the final wire bytes)
//! deterministic for identical compositions.
//!
//! # Fee estimation
//!
//! [`TxBuilder::estimate_transaction`] iterates composition until the fee
//! paid covers the data fee implied by the transaction's own size. Unsigned
//! skeletons are padded by [`SIGNATURE_SIZE_PER_INPUT`] bytes per input;
//! signed ones corrected by [`SIGNED_SIZE_DELTA_PER_INPUT`]. Both values
//! are empirical calibration constants.

use kaslite_core::constants::{
    DEFAULT_SEQUENCE, MAX_MASS_ACCEPTED_BY_BLOCK, SUBNETWORK_ID_NATIVE, TX_VERSION,
};
use kaslite_core::{
    Address, ScriptPublicKey, SubmitTransactionRequest, Transaction, TransactionId,
    TransactionInput, TransactionOutpoint, TransactionOutput, UtxoEntry,
};

use crate::addresses::{AddressKind, AddressManager};
use crate::error::WalletError;
use crate::utxo::{UtxoSelection, UtxoSet};

/// Signature-script allowance added per input when measuring an unsigned
/// skeleton for fee purposes. Empirical calibration constant.
pub const SIGNATURE_SIZE_PER_INPUT: u64 = 151;

/// Correction subtracted per input once signatures are in place.
/// Empirical calibration constant.
pub const SIGNED_SIZE_DELTA_PER_INPUT: u64 = 2;

/// Upper bound on fee-convergence rounds before giving up.
const MAX_FEE_ROUNDS: usize = 16;

/// SIGHASH_ALL type byte appended to every signature script.
const SIGHASH_ALL: u8 = 0x01;

/// Parameters for composing an outgoing transaction.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recipient address.
    pub to: Address,
    /// Amount in sompi. With `inclusive_fee`, the fee is taken out of this
    /// amount instead of being added on top.
    pub amount: u64,
    /// Additional fee in sompi on top of the computed data fee.
    pub priority_fee: u64,
    /// Subtract the fee from `amount` rather than charging the sender
    /// extra.
    pub inclusive_fee: bool,
    /// Run the iterative data-fee estimate. When false, `priority_fee`
    /// must cover the transaction size on its own.
    pub calculate_network_fee: bool,
    /// Reject the build when the total fee would exceed this ceiling.
    /// Zero disables the check.
    pub network_fee_max: u64,
    /// Use this change address instead of reserving one from the change
    /// chain.
    pub change_address: Option<Address>,
    /// Leave inputs unsigned (estimates only; a final build always signs).
    pub skip_sign: bool,
    /// Compound mode: consume up to this many of the largest confirmed
    /// UTXOs and send the aggregate (minus fee) to `to`.
    pub compound_max_inputs: Option<usize>,
}

impl SendRequest {
    /// A plain send with automatic fee calculation.
    pub fn new(to: Address, amount: u64) -> Self {
        Self {
            to,
            amount,
            priority_fee: 0,
            inclusive_fee: false,
            calculate_network_fee: true,
            network_fee_max: 0,
            change_address: None,
            skip_sign: false,
            compound_max_inputs: None,
        }
    }
}

/// A composed transaction candidate, signed or unsigned.
#[derive(Debug, Clone)]
pub struct ComposedTransaction {
    /// The assembled transaction.
    pub tx: Transaction,
    /// Fee in sompi.
    pub fee: u64,
    /// Amount paid to the recipient in sompi.
    pub amount: u64,
    /// Change returned to the wallet in sompi.
    pub change: u64,
    /// Sum of the consumed inputs in sompi.
    pub total_input: u64,
    /// The consumed entries, input order.
    pub utxos: Vec<UtxoEntry>,
    /// Outpoints of the consumed entries, input order.
    pub outpoints: Vec<TransactionOutpoint>,
    /// The change address used for this composition.
    pub change_address: Address,
    /// Whether composing reserved a fresh change index (as opposed to an
    /// override supplied by the caller).
    pub derived_change: bool,
    /// Whether the inputs carry signatures.
    pub signed: bool,
}

impl ComposedTransaction {
    /// Transaction id of the candidate.
    pub fn id(&self) -> Result<TransactionId, WalletError> {
        Ok(self.tx.id()?)
    }

    /// Serialized size used for fee purposes: the skeleton size padded per
    /// unsigned input, or corrected per signed input.
    pub fn size_for_fee(&self) -> u64 {
        let base = self.tx.estimated_serialized_size();
        let inputs = self.tx.inputs.len() as u64;
        if self.signed {
            base.saturating_sub(SIGNED_SIZE_DELTA_PER_INPUT * inputs)
        } else {
            base + SIGNATURE_SIZE_PER_INPUT * inputs
        }
    }
}

/// Composes, estimates, and signs transactions against a wallet's UTXO set
/// and address chains.
pub struct TxBuilder<'a> {
    utxos: &'a UtxoSet,
    addresses: &'a mut AddressManager,
    fee_per_byte: u64,
}

impl<'a> TxBuilder<'a> {
    /// Create a builder borrowing the wallet's UTXO set and address
    /// manager.
    pub fn new(utxos: &'a UtxoSet, addresses: &'a mut AddressManager, fee_per_byte: u64) -> Self {
        Self {
            utxos,
            addresses,
            fee_per_byte,
        }
    }

    /// Compose a transaction candidate carrying exactly `fee`.
    ///
    /// Selects inputs (or collects them in compound mode), resolves the
    /// change address, assembles outputs so that inputs equal outputs plus
    /// fee, and signs unless the request skips signing. A reservation made
    /// on the change chain is reversed on every failure path.
    pub fn compose_transaction(
        &mut self,
        request: &SendRequest,
        fee: u64,
    ) -> Result<ComposedTransaction, WalletError> {
        let (selection, recipient_amount) = self.select_for(request, fee)?;

        let spent = recipient_amount
            .checked_add(fee)
            .ok_or_else(|| WalletError::InvalidAmount("amount plus fee overflows".into()))?;
        let change =
            selection
                .total_amount
                .checked_sub(spent)
                .ok_or(WalletError::ChangeUnderflow {
                    inputs: selection.total_amount,
                    amount: recipient_amount,
                    fee,
                })?;

        let (change_address, derived_change) = match &request.change_address {
            Some(address) => (address.clone(), false),
            None => (self.addresses.next(AddressKind::Change)?, true),
        };

        match self.assemble(request, selection, recipient_amount, fee, change, change_address) {
            Ok(mut composed) => {
                composed.derived_change = derived_change;
                Ok(composed)
            }
            Err(e) => {
                if derived_change {
                    self.addresses.reverse(AddressKind::Change);
                }
                Err(e)
            }
        }
    }

    /// Compose with iterative fee convergence.
    ///
    /// Starts from the priority fee, recomputes the data fee from the
    /// candidate's own size, and repeats until the fee paid covers
    /// `data_fee + priority_fee`. The change address is reserved once on
    /// the first round and passed as an override afterwards; any failure
    /// reverses that reservation.
    pub fn estimate_transaction(
        &mut self,
        request: &SendRequest,
    ) -> Result<ComposedTransaction, WalletError> {
        let priority_fee = request.priority_fee;

        if !request.calculate_network_fee {
            let composed = self.compose_transaction(request, priority_fee)?;
            let data_fee = composed.size_for_fee() * self.fee_per_byte;
            if data_fee > priority_fee {
                self.rollback(&composed);
                return Err(WalletError::MinimumFeeRequired { required: data_fee });
            }
            return Ok(composed);
        }

        let mut request = request.clone();
        let mut fee = priority_fee;
        let mut reserved_change = false;

        for _round in 0..MAX_FEE_ROUNDS {
            let composed = match self.compose_transaction(&request, fee) {
                Ok(composed) => composed,
                Err(e) => {
                    if reserved_change {
                        self.addresses.reverse(AddressKind::Change);
                    }
                    return Err(e);
                }
            };
            if composed.derived_change {
                reserved_change = true;
                request.change_address = Some(composed.change_address.clone());
            }

            let data_fee = composed.size_for_fee() * self.fee_per_byte;
            let required = priority_fee.saturating_add(data_fee);

            if request.network_fee_max > 0 && required > request.network_fee_max {
                if reserved_change {
                    self.addresses.reverse(AddressKind::Change);
                }
                return Err(WalletError::FeeLimitExceeded {
                    fee: required,
                    max: request.network_fee_max,
                });
            }

            if fee >= required {
                let mut composed = composed;
                composed.derived_change = reserved_change;
                return Ok(composed);
            }
            fee = required;
        }

        if reserved_change {
            self.addresses.reverse(AddressKind::Change);
        }
        Err(WalletError::FeeEstimateDiverged(MAX_FEE_ROUNDS))
    }

    /// Produce the final signed transaction and its submission payload.
    ///
    /// Runs the fee estimate, signs (regardless of `skip_sign`), enforces
    /// the block mass ceiling, and converts to the RPC wire shape.
    pub fn build_transaction(
        &mut self,
        request: &SendRequest,
    ) -> Result<(ComposedTransaction, SubmitTransactionRequest), WalletError> {
        let mut composed = self.estimate_transaction(request)?;

        if !composed.signed {
            if let Err(e) = self.sign_composed(&mut composed) {
                self.rollback(&composed);
                return Err(e);
            }
        }

        let mass = composed.tx.mass();
        if mass > MAX_MASS_ACCEPTED_BY_BLOCK {
            self.rollback(&composed);
            return Err(WalletError::MassExceeded {
                mass,
                max: MAX_MASS_ACCEPTED_BY_BLOCK,
            });
        }

        let wire = SubmitTransactionRequest {
            transaction: composed.tx.to_rpc(composed.fee),
        };
        Ok((composed, wire))
    }

    /// Sign every input of a composed candidate in place.
    pub fn sign_composed(&self, composed: &mut ComposedTransaction) -> Result<(), WalletError> {
        for i in 0..composed.utxos.len() {
            let utxo = &composed.utxos[i];
            let key = self
                .addresses
                .keychain()
                .signing_key_for_address(&utxo.address)
                .ok_or_else(|| WalletError::KeyNotFound(utxo.address.to_string()))?;

            let digest = sighash_all(&composed.tx, i, utxo);
            let signature = key
                .sign_raw(&digest, &[0u8; 32])
                .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
            composed.tx.inputs[i].signature_script = signature_script(&signature.to_bytes());
        }
        composed.signed = true;
        Ok(())
    }

    /// Selection and recipient amount for the request at the given fee.
    fn select_for(
        &self,
        request: &SendRequest,
        fee: u64,
    ) -> Result<(UtxoSelection, u64), WalletError> {
        if let Some(max_inputs) = request.compound_max_inputs {
            let selection = self.utxos.collect_utxos(max_inputs)?;
            let recipient = selection
                .total_amount
                .checked_sub(fee)
                .filter(|v| *v > 0)
                .ok_or(WalletError::InsufficientFunds {
                    available: selection.total_amount,
                    required: fee,
                })?;
            return Ok((selection, recipient));
        }

        if request.amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
        }

        if request.inclusive_fee {
            let recipient = request
                .amount
                .checked_sub(fee)
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    WalletError::InvalidAmount(format!(
                        "amount {} does not cover inclusive fee {}",
                        request.amount, fee
                    ))
                })?;
            let selection = self.utxos.select_utxos(request.amount)?;
            Ok((selection, recipient))
        } else {
            let target = request
                .amount
                .checked_add(fee)
                .ok_or_else(|| WalletError::InvalidAmount("amount plus fee overflows".into()))?;
            let selection = self.utxos.select_utxos(target)?;
            Ok((selection, request.amount))
        }
    }

    /// Assemble the transaction and sign it unless the request skips
    /// signing.
    fn assemble(
        &mut self,
        request: &SendRequest,
        selection: UtxoSelection,
        recipient_amount: u64,
        fee: u64,
        change: u64,
        change_address: Address,
    ) -> Result<ComposedTransaction, WalletError> {
        let inputs = selection
            .utxos
            .iter()
            .map(|utxo| TransactionInput {
                previous_outpoint: utxo.outpoint.clone(),
                signature_script: Vec::new(),
                sequence: DEFAULT_SEQUENCE,
            })
            .collect();

        let mut outputs = vec![TransactionOutput {
            amount: recipient_amount,
            script_public_key: ScriptPublicKey::pay_to_address(&request.to),
        }];
        if change > 0 {
            outputs.push(TransactionOutput {
                amount: change,
                script_public_key: ScriptPublicKey::pay_to_address(&change_address),
            });
        }

        let tx = Transaction {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
            subnetwork_id: SUBNETWORK_ID_NATIVE,
            payload: Vec::new(),
        };

        let mut composed = ComposedTransaction {
            tx,
            fee,
            amount: recipient_amount,
            change,
            total_input: selection.total_amount,
            utxos: selection.utxos,
            outpoints: selection.outpoints,
            change_address,
            derived_change: false,
            signed: false,
        };

        if !request.skip_sign {
            self.sign_composed(&mut composed)?;
        }
        Ok(composed)
    }

    /// Undo a change-chain reservation recorded on a composed candidate.
    fn rollback(&mut self, composed: &ComposedTransaction) {
        if composed.derived_change {
            self.addresses.reverse(AddressKind::Change);
        }
    }
}

/// The SIGHASH_ALL digest for one input.
pub fn sighash_all(tx: &Transaction, input_index: usize, spent: &UtxoEntry) -> [u8; 32] {
    let mut data = Vec::with_capacity(128 + 48 * tx.inputs.len() + 52 * tx.outputs.len());
    data.extend_from_slice(&tx.version.to_le_bytes());
    for input in &tx.inputs {
        data.extend_from_slice(input.previous_outpoint.transaction_id.as_bytes());
        data.extend_from_slice(&input.previous_outpoint.index.to_le_bytes());
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }
    for output in &tx.outputs {
        data.extend_from_slice(&output.amount.to_le_bytes());
        data.extend_from_slice(&output.script_public_key.version.to_le_bytes());
        data.extend_from_slice(&output.script_public_key.script);
    }
    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data.extend_from_slice(&tx.subnetwork_id);
    data.extend_from_slice(&(input_index as u32).to_le_bytes());
    data.extend_from_slice(&spent.amount.to_le_bytes());
    data.extend_from_slice(&spent.script_public_key.script);
    data.push(SIGHASH_ALL);
    blake3::hash(&data).into()
}

/// Encode a signature script: a 64-byte Schnorr signature pushed together
/// with the SIGHASH_ALL type byte.
fn signature_script(signature: &[u8; 64]) -> Vec<u8> {
    let mut script = Vec::with_capacity(66);
    script.push(0x41);
    script.extend_from_slice(signature);
    script.push(SIGHASH_ALL);
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::schnorr::Signature;

    use kaslite_core::constants::DEFAULT_FEE_PER_BYTE;
    use kaslite_core::{NetworkType, TransactionId};

    use crate::events::EventEmitter;
    use crate::keys::KeyChain;

    const PHRASE: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    fn manager() -> AddressManager {
        let keys = KeyChain::from_phrase(PHRASE, NetworkType::Testnet).unwrap();
        AddressManager::new(keys, EventEmitter::new()).unwrap()
    }

    fn utxo_for(address: &Address, txid_byte: u8, amount: u64) -> UtxoEntry {
        UtxoEntry {
            outpoint: TransactionOutpoint::new(TransactionId([txid_byte; 32]), 0),
            address: address.clone(),
            amount,
            script_public_key: ScriptPublicKey::pay_to_address(address),
            block_blue_score: 50,
            is_coinbase: false,
        }
    }

    /// A funded set and manager: receive index 0 holds the given amounts.
    fn funded(amounts: &[u64]) -> (UtxoSet, AddressManager) {
        let mut mgr = manager();
        let address = mgr.current(AddressKind::Receive).clone();
        let mut set = UtxoSet::new(NetworkType::Testnet);
        set.update_blue_score(100);
        set.add(
            amounts
                .iter()
                .enumerate()
                .map(|(i, &amount)| utxo_for(&address, i as u8 + 1, amount)),
        );
        (set, mgr)
    }

    fn recipient() -> Address {
        Address::from_public_key([0xEE; 32], NetworkType::Testnet)
    }

    #[test]
    fn simple_send_selects_largest_and_returns_change() {
        let (set, mut mgr) = funded(&[10_000, 5_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 7_000);
        request.priority_fee = 500;
        let composed = builder.estimate_transaction(&request).unwrap();

        assert_eq!(composed.utxos.len(), 1);
        assert_eq!(composed.utxos[0].amount, 10_000);
        assert_eq!(composed.amount, 7_000);
        assert_eq!(composed.tx.outputs[0].amount, 7_000);
        assert_eq!(composed.change, 10_000 - 7_000 - composed.fee);
        assert!(composed.fee >= composed.size_for_fee() * DEFAULT_FEE_PER_BYTE + 500);
    }

    #[test]
    fn inputs_equal_outputs_plus_fee() {
        let (set, mut mgr) = funded(&[10_000, 5_000, 3_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let composed = builder
            .estimate_transaction(&SendRequest::new(recipient(), 12_000))
            .unwrap();
        let outputs: u64 = composed.tx.outputs.iter().map(|o| o.amount).sum();
        assert_eq!(composed.total_input, outputs + composed.fee);
    }

    #[test]
    fn insufficient_funds_surfaces_amounts() {
        let (set, mut mgr) = funded(&[1_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let err = builder
            .estimate_transaction(&SendRequest::new(recipient(), 2_000))
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    }

    #[test]
    fn fee_converges_and_covers_size() {
        let (set, mut mgr) = funded(&[600, 600, 600, 600, 600, 600, 600, 600]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 2_000);
        request.priority_fee = 100;
        let composed = builder.estimate_transaction(&request).unwrap();

        let data_fee = composed.size_for_fee() * DEFAULT_FEE_PER_BYTE;
        assert!(composed.fee >= data_fee + 100, "fee {} < {}", composed.fee, data_fee + 100);
    }

    #[test]
    fn inclusive_fee_comes_out_of_amount() {
        let (set, mut mgr) = funded(&[10_000, 10_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 10_000);
        request.inclusive_fee = true;
        request.priority_fee = 200;
        let composed = builder.estimate_transaction(&request).unwrap();

        // The recipient gets amount minus fee; the sender's side consumes
        // exactly the requested amount.
        assert_eq!(composed.amount, 10_000 - composed.fee);
        assert_eq!(composed.amount + composed.change + composed.fee, composed.total_input);
        assert_eq!(composed.change, composed.total_input - 10_000);
    }

    #[test]
    fn change_output_omitted_when_zero() {
        let (set, mut mgr) = funded(&[10_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 10_000);
        request.inclusive_fee = true;
        let composed = builder.estimate_transaction(&request).unwrap();

        assert_eq!(composed.change, 0);
        assert_eq!(composed.tx.outputs.len(), 1);
        assert_eq!(composed.amount, 10_000 - composed.fee);
    }

    #[test]
    fn disabled_auto_fee_requires_covering_priority() {
        let (set, mut mgr) = funded(&[10_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 1_000);
        request.calculate_network_fee = false;
        request.priority_fee = 1; // far below the data fee
        let err = builder.estimate_transaction(&request).unwrap_err();
        assert!(matches!(err, WalletError::MinimumFeeRequired { .. }));

        // A generous priority fee passes without iteration.
        request.priority_fee = 5_000;
        let composed = builder.estimate_transaction(&request).unwrap();
        assert_eq!(composed.fee, 5_000);
    }

    #[test]
    fn network_fee_max_bounds_the_estimate() {
        let (set, mut mgr) = funded(&[10_000]);
        let change_before = mgr.counter(AddressKind::Change);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 1_000);
        request.network_fee_max = 10; // below any realistic data fee
        let err = builder.estimate_transaction(&request).unwrap_err();
        assert!(matches!(err, WalletError::FeeLimitExceeded { .. }));
        // The change reservation was rolled back.
        assert_eq!(mgr.counter(AddressKind::Change), change_before);
    }

    #[test]
    fn failure_reverses_change_reservation() {
        let (set, mut mgr) = funded(&[1_000]);
        let change_before = mgr.counter(AddressKind::Change);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        // Selection fails before any change derivation.
        let err = builder
            .estimate_transaction(&SendRequest::new(recipient(), 50_000))
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));
        assert_eq!(mgr.counter(AddressKind::Change), change_before);
    }

    #[test]
    fn success_consumes_one_change_index() {
        let (set, mut mgr) = funded(&[10_000]);
        let change_before = mgr.counter(AddressKind::Change);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let composed = builder
            .estimate_transaction(&SendRequest::new(recipient(), 2_000))
            .unwrap();
        assert!(composed.derived_change);
        assert_eq!(mgr.counter(AddressKind::Change), change_before + 1);
        assert_eq!(mgr.current(AddressKind::Change), &composed.change_address);
    }

    #[test]
    fn change_override_reserves_nothing() {
        let (set, mut mgr) = funded(&[10_000]);
        let override_addr = Address::from_public_key([0xCC; 32], NetworkType::Testnet);
        let change_before = mgr.counter(AddressKind::Change);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 2_000);
        request.change_address = Some(override_addr.clone());
        let composed = builder.estimate_transaction(&request).unwrap();

        assert!(!composed.derived_change);
        assert_eq!(composed.change_address, override_addr);
        assert_eq!(mgr.counter(AddressKind::Change), change_before);
    }

    #[test]
    fn composition_is_deterministic_with_override() {
        let compose = || {
            let (set, mut mgr) = funded(&[10_000, 5_000]);
            let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);
            let mut request = SendRequest::new(recipient(), 7_000);
            request.priority_fee = 500;
            request.change_address =
                Some(Address::from_public_key([0xCC; 32], NetworkType::Testnet));
            let (composed, wire) = builder.build_transaction(&request).unwrap();
            (composed.tx, wire)
        };
        let (tx1, wire1) = compose();
        let (tx2, wire2) = compose();
        assert_eq!(tx1, tx2);
        assert_eq!(
            serde_json::to_string(&wire1).unwrap(),
            serde_json::to_string(&wire2).unwrap()
        );
    }

    #[test]
    fn build_signs_and_verifies() {
        let (set, mut mgr) = funded(&[10_000, 8_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let (composed, wire) = builder
            .build_transaction(&SendRequest::new(recipient(), 12_000))
            .unwrap();
        assert!(composed.signed);
        assert_eq!(wire.transaction.inputs.len(), composed.tx.inputs.len());

        for (i, input) in composed.tx.inputs.iter().enumerate() {
            assert_eq!(input.signature_script.len(), 66);
            assert_eq!(input.signature_script[0], 0x41);
            assert_eq!(input.signature_script[65], SIGHASH_ALL);

            let utxo = &composed.utxos[i];
            let key = mgr
                .keychain()
                .signing_key_for_address(&utxo.address)
                .unwrap();
            let digest = sighash_all(&composed.tx, i, utxo);
            let signature =
                Signature::try_from(&input.signature_script[1..65]).unwrap();
            key.verifying_key()
                .verify_raw(&digest, &signature)
                .expect("signature must verify");
        }
    }

    #[test]
    fn skip_sign_estimate_leaves_inputs_empty() {
        let (set, mut mgr) = funded(&[10_000]);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let mut request = SendRequest::new(recipient(), 2_000);
        request.skip_sign = true;
        let composed = builder.estimate_transaction(&request).unwrap();
        assert!(!composed.signed);
        assert!(composed.tx.inputs.iter().all(|i| i.signature_script.is_empty()));
        // Unsigned sizing pads per input.
        assert!(composed.size_for_fee() > composed.tx.estimated_serialized_size());
    }

    #[test]
    fn sign_fails_for_foreign_input() {
        let (mut set, mut mgr) = funded(&[10_000]);
        // Sneak in a foreign-address UTXO large enough to be selected first.
        let foreign = Address::from_public_key([0x99; 32], NetworkType::Testnet);
        set.add(vec![utxo_for(&foreign, 0xF0, 50_000)]);
        let change_before = mgr.counter(AddressKind::Change);
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);

        let err = builder
            .estimate_transaction(&SendRequest::new(recipient(), 20_000))
            .unwrap_err();
        assert!(matches!(err, WalletError::KeyNotFound(_)));
        assert_eq!(mgr.counter(AddressKind::Change), change_before);
    }

    #[test]
    fn compound_collects_up_to_max_inputs() {
        let mut mgr = manager();
        let address = mgr.current(AddressKind::Receive).clone();
        let mut set = UtxoSet::new(NetworkType::Testnet);
        set.update_blue_score(100);
        for i in 0..150u32 {
            set.add(vec![UtxoEntry {
                outpoint: TransactionOutpoint::new(TransactionId([(i / 4) as u8; 32]), i % 4),
                address: address.clone(),
                amount: 1_000,
                script_public_key: ScriptPublicKey::pay_to_address(&address),
                block_blue_score: 50,
                is_coinbase: false,
            }]);
        }

        let target = mgr.next(AddressKind::Change).unwrap();
        let mut builder = TxBuilder::new(&set, &mut mgr, DEFAULT_FEE_PER_BYTE);
        let mut request = SendRequest::new(target.clone(), 0);
        request.compound_max_inputs = Some(100);
        request.change_address = Some(target.clone());

        let (composed, _wire) = builder.build_transaction(&request).unwrap();
        assert_eq!(composed.tx.inputs.len(), 100);
        assert_eq!(composed.tx.outputs.len(), 1);
        assert_eq!(composed.amount, 100_000 - composed.fee);
        assert_eq!(composed.change, 0);
        assert_eq!(
            composed.tx.outputs[0].script_public_key,
            ScriptPublicKey::pay_to_address(&target)
        );
    }
}
