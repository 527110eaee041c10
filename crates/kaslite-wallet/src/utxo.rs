//! Indexed, classified UTXO tracking with maturity-aware balances.
//!
//! The set keeps three disjoint keyed collections: `confirmed` (spendable
//! at the current blue score), `pending` (known but immature), and `used`
//! (spent by a locally submitted transaction the node has not yet
//! reflected). A per-address index supports subscription bookkeeping, and
//! the `in_use` reservation list prevents double-selection across in-flight
//! builds. All operations here are pure and synchronous; event emission is
//! the wallet's job.

use std::collections::{HashMap, HashSet};

use kaslite_core::constants::{ESTIMATED_MASS_PER_INPUT, MAX_MASS_UTXOS};
use kaslite_core::{Address, NetworkType, TransactionOutpoint, UtxoEntry};

use crate::error::WalletError;

/// Aggregate wallet balance in sompi.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    /// Spendable confirmed balance.
    pub available: u64,
    /// Known but immature balance.
    pub pending: u64,
    /// Confirmed plus pending.
    pub total: u64,
}

impl Balance {
    fn new(available: u64, pending: u64) -> Self {
        Self {
            available,
            pending,
            total: available + pending,
        }
    }
}

/// Result of UTXO selection for a transaction build.
#[derive(Debug, Clone)]
pub struct UtxoSelection {
    /// Selected entries, in selection order (largest first).
    pub utxos: Vec<UtxoEntry>,
    /// Outpoints of the selected entries, same order.
    pub outpoints: Vec<TransactionOutpoint>,
    /// Sum of the selected amounts in sompi.
    pub total_amount: u64,
    /// Estimated input mass of the selection.
    pub estimated_mass: u64,
}

/// The wallet's view of its unspent outputs.
pub struct UtxoSet {
    confirmed: HashMap<TransactionOutpoint, UtxoEntry>,
    pending: HashMap<TransactionOutpoint, UtxoEntry>,
    used: HashMap<TransactionOutpoint, UtxoEntry>,
    /// Address -> outpoints across all three collections.
    by_address: HashMap<Address, HashSet<TransactionOutpoint>>,
    /// Outpoints reserved by in-flight or submitted builds.
    in_use: Vec<TransactionOutpoint>,
    /// Current virtual selected parent blue score.
    blue_score: u64,
    coinbase_maturity: u64,
    standard_maturity: u64,
    confirmed_total: u64,
    pending_total: u64,
}

impl UtxoSet {
    /// Create an empty set with the maturity depths of the given network.
    pub fn new(network: NetworkType) -> Self {
        Self {
            confirmed: HashMap::new(),
            pending: HashMap::new(),
            used: HashMap::new(),
            by_address: HashMap::new(),
            in_use: Vec::new(),
            blue_score: 0,
            coinbase_maturity: network.coinbase_maturity(),
            standard_maturity: network.standard_maturity(),
            confirmed_total: 0,
            pending_total: 0,
        }
    }

    /// Current aggregate balance.
    pub fn balance(&self) -> Balance {
        Balance::new(self.confirmed_total, self.pending_total)
    }

    /// The blue score the set is classified against.
    pub fn blue_score(&self) -> u64 {
        self.blue_score
    }

    /// Number of confirmed entries.
    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Number of pending entries.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of used entries.
    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Whether an outpoint is reserved by an in-flight build.
    pub fn is_in_use(&self, outpoint: &TransactionOutpoint) -> bool {
        self.in_use.contains(outpoint)
    }

    /// Set the blue score and reclassify. Returns true when the aggregate
    /// balance changed.
    pub fn update_blue_score(&mut self, blue_score: u64) -> bool {
        self.blue_score = blue_score;
        self.update_utxo_balance()
    }

    /// Reclassify every entry against the current blue score, migrating
    /// between `confirmed` and `pending`. Returns true when the aggregate
    /// balance changed.
    pub fn update_utxo_balance(&mut self) -> bool {
        let before = self.balance();

        let matured: Vec<TransactionOutpoint> = self
            .pending
            .iter()
            .filter(|(_, utxo)| self.is_mature(utxo))
            .map(|(op, _)| op.clone())
            .collect();
        for op in matured {
            if let Some(utxo) = self.pending.remove(&op) {
                self.pending_total -= utxo.amount;
                self.confirmed_total += utxo.amount;
                self.confirmed.insert(op, utxo);
            }
        }

        // Blue score only moves forward on a healthy chain, but a reorg can
        // demote previously confirmed entries.
        let demoted: Vec<TransactionOutpoint> = self
            .confirmed
            .iter()
            .filter(|(_, utxo)| !self.is_mature(utxo))
            .map(|(op, _)| op.clone())
            .collect();
        for op in demoted {
            if let Some(utxo) = self.confirmed.remove(&op) {
                self.confirmed_total -= utxo.amount;
                self.pending_total += utxo.amount;
                self.pending.insert(op, utxo);
            }
        }

        self.balance() != before
    }

    /// Insert entries, classifying each by maturity at the current blue
    /// score. Idempotent per outpoint: re-adding updates the stored fields,
    /// preserves any `in_use` reservation, and does not resurrect an
    /// outpoint we already marked as spent. Returns how many entries were
    /// not previously tracked.
    pub fn add<I: IntoIterator<Item = UtxoEntry>>(&mut self, utxos: I) -> usize {
        let mut fresh = 0;
        for utxo in utxos {
            let op = utxo.outpoint.clone();

            if self.used.contains_key(&op) {
                self.used.insert(op.clone(), utxo.clone());
                self.index_address(&utxo.address, &op);
                continue;
            }

            let existed = self.evict(&op);
            if !existed {
                fresh += 1;
            }

            self.index_address(&utxo.address, &op);
            if self.is_mature(&utxo) {
                self.confirmed_total += utxo.amount;
                self.confirmed.insert(op, utxo);
            } else {
                self.pending_total += utxo.amount;
                self.pending.insert(op, utxo);
            }
        }
        fresh
    }

    /// Remove outpoints from every collection and index. Returns how many
    /// were present.
    pub fn remove(&mut self, outpoints: &[TransactionOutpoint]) -> usize {
        let mut removed = 0;
        for op in outpoints {
            let mut address = None;
            if let Some(utxo) = self.confirmed.remove(op) {
                self.confirmed_total -= utxo.amount;
                address = Some(utxo.address);
            } else if let Some(utxo) = self.pending.remove(op) {
                self.pending_total -= utxo.amount;
                address = Some(utxo.address);
            } else if let Some(utxo) = self.used.remove(op) {
                address = Some(utxo.address);
            }

            if let Some(addr) = address {
                removed += 1;
                self.unindex_address(&addr, op);
            }
            self.in_use.retain(|reserved| reserved != op);
        }
        removed
    }

    /// Greedy selection from confirmed entries, skipping reservations,
    /// largest amount first with the outpoint string as tiebreak, until the
    /// accumulated amount reaches `target`.
    pub fn select_utxos(&self, target: u64) -> Result<UtxoSelection, WalletError> {
        if target == 0 {
            return Err(WalletError::InvalidAmount("target must be non-zero".into()));
        }
        let candidates = self.spendable_ordered();
        if candidates.is_empty() {
            return Err(WalletError::NoUtxos);
        }

        let mut selection = UtxoSelection {
            utxos: Vec::new(),
            outpoints: Vec::new(),
            total_amount: 0,
            estimated_mass: 0,
        };
        let mut available: u64 = 0;
        for utxo in &candidates {
            available = available.saturating_add(utxo.amount);
        }

        for utxo in candidates {
            let mass = selection.estimated_mass + ESTIMATED_MASS_PER_INPUT;
            if mass > MAX_MASS_UTXOS {
                return Err(WalletError::MassExceeded {
                    mass,
                    max: MAX_MASS_UTXOS,
                });
            }
            selection.total_amount = selection.total_amount.saturating_add(utxo.amount);
            selection.estimated_mass = mass;
            selection.outpoints.push(utxo.outpoint.clone());
            selection.utxos.push(utxo);

            if selection.total_amount >= target {
                return Ok(selection);
            }
        }

        Err(WalletError::InsufficientFunds {
            available,
            required: target,
        })
    }

    /// Take up to `max_count` confirmed entries, largest first, capped by
    /// the input mass budget. Used for compounding.
    pub fn collect_utxos(&self, max_count: usize) -> Result<UtxoSelection, WalletError> {
        let candidates = self.spendable_ordered();
        if candidates.is_empty() {
            return Err(WalletError::NoUtxos);
        }

        let mass_cap = (MAX_MASS_UTXOS / ESTIMATED_MASS_PER_INPUT) as usize;
        let count = max_count.min(mass_cap);

        let mut selection = UtxoSelection {
            utxos: Vec::new(),
            outpoints: Vec::new(),
            total_amount: 0,
            estimated_mass: 0,
        };
        for utxo in candidates.into_iter().take(count) {
            selection.total_amount = selection.total_amount.saturating_add(utxo.amount);
            selection.estimated_mass += ESTIMATED_MASS_PER_INPUT;
            selection.outpoints.push(utxo.outpoint.clone());
            selection.utxos.push(utxo);
        }
        Ok(selection)
    }

    /// Move entries into `used` and reserve their outpoints. Called after a
    /// successful submission.
    pub fn update_used(&mut self, utxos: &[UtxoEntry]) {
        for utxo in utxos {
            let op = &utxo.outpoint;
            if let Some(entry) = self.confirmed.remove(op) {
                self.confirmed_total -= entry.amount;
                self.used.insert(op.clone(), entry);
            } else if let Some(entry) = self.pending.remove(op) {
                self.pending_total -= entry.amount;
                self.used.insert(op.clone(), entry);
            } else {
                continue;
            }
            if !self.in_use.contains(op) {
                self.in_use.push(op.clone());
            }
        }
    }

    /// Drop every `used` entry and clear the reservation list.
    pub fn clear_used(&mut self) {
        let ops: Vec<TransactionOutpoint> = self.used.keys().cloned().collect();
        for op in ops {
            if let Some(utxo) = self.used.remove(&op) {
                self.unindex_address(&utxo.address, &op);
            }
        }
        self.in_use.clear();
    }

    /// Drop every tracked outpoint absent from the latest authoritative
    /// listing. Returns how many entries were dropped.
    pub fn clear_missing(&mut self, live: &HashSet<TransactionOutpoint>) -> usize {
        let stale: Vec<TransactionOutpoint> = self
            .confirmed
            .keys()
            .chain(self.pending.keys())
            .chain(self.used.keys())
            .filter(|op| !live.contains(*op))
            .cloned()
            .collect();
        self.remove(&stale)
    }

    /// Every address with at least one tracked outpoint.
    pub fn addresses(&self) -> Vec<Address> {
        self.by_address.keys().cloned().collect()
    }

    fn is_mature(&self, utxo: &UtxoEntry) -> bool {
        utxo.is_mature_at(self.blue_score, self.coinbase_maturity, self.standard_maturity)
    }

    /// Confirmed entries not reserved, descending by amount with the
    /// outpoint string as tiebreak so selection is deterministic.
    fn spendable_ordered(&self) -> Vec<UtxoEntry> {
        let mut candidates: Vec<UtxoEntry> = self
            .confirmed
            .values()
            .filter(|utxo| !self.in_use.contains(&utxo.outpoint))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.amount
                .cmp(&a.amount)
                .then_with(|| a.outpoint.to_string().cmp(&b.outpoint.to_string()))
        });
        candidates
    }

    /// Remove an outpoint from confirmed/pending, keeping totals exact.
    /// Returns whether it was tracked anywhere (including `used`).
    fn evict(&mut self, op: &TransactionOutpoint) -> bool {
        if let Some(old) = self.confirmed.remove(op) {
            self.confirmed_total -= old.amount;
            self.unindex_address(&old.address, op);
            true
        } else if let Some(old) = self.pending.remove(op) {
            self.pending_total -= old.amount;
            self.unindex_address(&old.address, op);
            true
        } else {
            self.used.contains_key(op)
        }
    }

    fn index_address(&mut self, address: &Address, op: &TransactionOutpoint) {
        self.by_address
            .entry(address.clone())
            .or_default()
            .insert(op.clone());
    }

    fn unindex_address(&mut self, address: &Address, op: &TransactionOutpoint) {
        if let Some(set) = self.by_address.get_mut(address) {
            set.remove(op);
            if set.is_empty() {
                self.by_address.remove(address);
            }
        }
    }

    /// Check structural invariants. Test support.
    #[cfg(test)]
    fn assert_consistent(&self) {
        for op in self.confirmed.keys() {
            assert!(!self.pending.contains_key(op), "confirmed ∩ pending: {op}");
            assert!(!self.used.contains_key(op), "confirmed ∩ used: {op}");
        }
        for op in self.pending.keys() {
            assert!(!self.used.contains_key(op), "pending ∩ used: {op}");
        }

        let mut indexed: HashSet<&TransactionOutpoint> = HashSet::new();
        for ops in self.by_address.values() {
            for op in ops {
                indexed.insert(op);
            }
        }
        for op in self
            .confirmed
            .keys()
            .chain(self.pending.keys())
            .chain(self.used.keys())
        {
            assert!(indexed.contains(op), "outpoint missing from index: {op}");
        }
        assert_eq!(
            indexed.len(),
            self.confirmed.len() + self.pending.len() + self.used.len(),
            "index tracks unknown outpoints"
        );

        let confirmed_sum: u64 = self.confirmed.values().map(|u| u.amount).sum();
        let pending_sum: u64 = self.pending.values().map(|u| u.amount).sum();
        assert_eq!(self.confirmed_total, confirmed_sum);
        assert_eq!(self.pending_total, pending_sum);
    }
}

impl std::fmt::Debug for UtxoSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoSet")
            .field("confirmed", &self.confirmed.len())
            .field("pending", &self.pending.len())
            .field("used", &self.used.len())
            .field("in_use", &self.in_use.len())
            .field("blue_score", &self.blue_score)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaslite_core::{ScriptPublicKey, TransactionId};

    fn addr(byte: u8) -> Address {
        Address::from_public_key([byte; 32], NetworkType::Testnet)
    }

    fn utxo(txid_byte: u8, index: u32, amount: u64, blue_score: u64, coinbase: bool) -> UtxoEntry {
        let address = addr(txid_byte);
        UtxoEntry {
            outpoint: TransactionOutpoint::new(TransactionId([txid_byte; 32]), index),
            script_public_key: ScriptPublicKey::pay_to_address(&address),
            address,
            amount,
            block_blue_score: blue_score,
            is_coinbase: coinbase,
        }
    }

    fn set_at(blue_score: u64) -> UtxoSet {
        let mut set = UtxoSet::new(NetworkType::Testnet);
        set.update_blue_score(blue_score);
        set
    }

    // --- add / classification ---

    #[test]
    fn add_classifies_by_maturity() {
        let mut set = set_at(100);
        set.add(vec![
            utxo(1, 0, 10_000, 50, false), // mature
            utxo(2, 0, 5_000, 100, false), // too recent
            utxo(3, 0, 7_000, 50, true),   // coinbase, immature at 100
        ]);
        assert_eq!(set.confirmed_count(), 1);
        assert_eq!(set.pending_count(), 2);
        assert_eq!(set.balance(), Balance::new(10_000, 12_000));
        set.assert_consistent();
    }

    #[test]
    fn add_is_idempotent_per_outpoint() {
        let mut set = set_at(100);
        let fresh = set.add(vec![utxo(1, 0, 10_000, 50, false)]);
        assert_eq!(fresh, 1);
        let fresh = set.add(vec![utxo(1, 0, 10_000, 50, false)]);
        assert_eq!(fresh, 0);
        assert_eq!(set.confirmed_count(), 1);
        assert_eq!(set.balance().available, 10_000);
        set.assert_consistent();
    }

    #[test]
    fn re_add_updates_fields() {
        let mut set = set_at(100);
        set.add(vec![utxo(1, 0, 10_000, 50, false)]);
        // Same outpoint reported with a different amount.
        let mut updated = utxo(1, 0, 12_000, 50, false);
        updated.block_blue_score = 60;
        set.add(vec![updated]);
        assert_eq!(set.balance().available, 12_000);
        set.assert_consistent();
    }

    #[test]
    fn add_does_not_resurrect_used() {
        let mut set = set_at(100);
        let spent = utxo(1, 0, 10_000, 50, false);
        set.add(vec![spent.clone()]);
        set.update_used(&[spent.clone()]);
        assert_eq!(set.used_count(), 1);

        // Node still reports the outpoint as live.
        set.add(vec![spent]);
        assert_eq!(set.used_count(), 1);
        assert_eq!(set.confirmed_count(), 0);
        assert_eq!(set.balance().available, 0);
        set.assert_consistent();
    }

    // --- remove ---

    #[test]
    fn remove_clears_all_collections() {
        let mut set = set_at(100);
        let a = utxo(1, 0, 10_000, 50, false);
        let b = utxo(2, 0, 5_000, 100, false);
        set.add(vec![a.clone(), b.clone()]);
        set.update_used(&[a.clone()]);

        let removed = set.remove(&[a.outpoint.clone(), b.outpoint.clone()]);
        assert_eq!(removed, 2);
        assert_eq!(set.confirmed_count() + set.pending_count() + set.used_count(), 0);
        assert!(!set.is_in_use(&a.outpoint));
        assert_eq!(set.balance(), Balance::default());
        set.assert_consistent();
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut set = set_at(100);
        set.add(vec![utxo(1, 0, 10_000, 50, false)]);
        let removed = set.remove(&[utxo(9, 9, 1, 1, false).outpoint]);
        assert_eq!(removed, 0);
        assert_eq!(set.confirmed_count(), 1);
        set.assert_consistent();
    }

    // --- blue score migration ---

    #[test]
    fn pending_matures_on_blue_score_advance() {
        let mut set = set_at(100);
        set.add(vec![utxo(1, 0, 7_000, 50, true)]); // coinbase, matures at 150
        assert_eq!(set.pending_count(), 1);

        let changed = set.update_blue_score(150);
        assert!(changed);
        assert_eq!(set.confirmed_count(), 1);
        assert_eq!(set.balance().available, 7_000);
        set.assert_consistent();
    }

    #[test]
    fn reorg_demotes_confirmed() {
        let mut set = set_at(200);
        set.add(vec![utxo(1, 0, 7_000, 150, true)]);
        // 150 + 100 <= 250 required; at 200 the coinbase is pending.
        assert_eq!(set.pending_count(), 1);
        set.update_blue_score(250);
        assert_eq!(set.confirmed_count(), 1);

        // Reorg winds the score back.
        let changed = set.update_blue_score(200);
        assert!(changed);
        assert_eq!(set.pending_count(), 1);
        assert_eq!(set.confirmed_count(), 0);
        set.assert_consistent();
    }

    #[test]
    fn no_balance_change_reports_false() {
        let mut set = set_at(100);
        set.add(vec![utxo(1, 0, 10_000, 50, false)]);
        assert!(!set.update_blue_score(101));
    }

    // --- selection ---

    #[test]
    fn select_largest_first() {
        let mut set = set_at(100);
        set.add(vec![
            utxo(1, 0, 10_000, 50, false),
            utxo(2, 0, 5_000, 50, false),
        ]);
        let selection = set.select_utxos(7_000).unwrap();
        assert_eq!(selection.utxos.len(), 1);
        assert_eq!(selection.utxos[0].amount, 10_000);
        assert_eq!(selection.total_amount, 10_000);
        assert_eq!(selection.estimated_mass, ESTIMATED_MASS_PER_INPUT);
    }

    #[test]
    fn select_accumulates_until_target() {
        let mut set = set_at(100);
        set.add(vec![
            utxo(1, 0, 4_000, 50, false),
            utxo(2, 0, 3_000, 50, false),
            utxo(3, 0, 2_000, 50, false),
        ]);
        let selection = set.select_utxos(6_000).unwrap();
        assert_eq!(selection.utxos.len(), 2);
        assert_eq!(selection.total_amount, 7_000);
    }

    #[test]
    fn select_is_deterministic_with_equal_amounts() {
        let build = || {
            let mut set = set_at(100);
            set.add(vec![
                utxo(3, 0, 5_000, 50, false),
                utxo(1, 0, 5_000, 50, false),
                utxo(2, 0, 5_000, 50, false),
            ]);
            set.select_utxos(9_000).unwrap().outpoints
        };
        let first = build();
        let second = build();
        assert_eq!(first, second);
        // Tiebreak is ascending outpoint string.
        assert!(first[0].to_string() < first[1].to_string());
    }

    #[test]
    fn select_ignores_pending() {
        let mut set = set_at(100);
        set.add(vec![
            utxo(1, 0, 10_000, 100, false), // pending
            utxo(2, 0, 2_000, 50, false),
        ]);
        let err = set.select_utxos(5_000).unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                available: 2_000,
                required: 5_000,
            }
        );
    }

    #[test]
    fn select_skips_in_use_reservations() {
        let mut set = set_at(100);
        let reserved = utxo(1, 0, 10_000, 50, false);
        set.add(vec![reserved.clone(), utxo(2, 0, 5_000, 50, false)]);
        set.update_used(&[reserved]);

        let selection = set.select_utxos(4_000).unwrap();
        assert_eq!(selection.utxos[0].amount, 5_000);
    }

    #[test]
    fn select_empty_set_fails() {
        let set = set_at(100);
        assert_eq!(set.select_utxos(1_000).unwrap_err(), WalletError::NoUtxos);
    }

    #[test]
    fn select_zero_target_rejected() {
        let mut set = set_at(100);
        set.add(vec![utxo(1, 0, 10_000, 50, false)]);
        assert!(matches!(
            set.select_utxos(0).unwrap_err(),
            WalletError::InvalidAmount(_)
        ));
    }

    // --- collect (compounding) ---

    #[test]
    fn collect_takes_up_to_max_count() {
        let mut set = set_at(100);
        for i in 0..150u32 {
            set.add(vec![utxo((i % 250) as u8, i, 1_000 + i as u64, 50, false)]);
        }
        let selection = set.collect_utxos(100).unwrap();
        assert_eq!(selection.utxos.len(), 100);
        // Largest first.
        assert!(selection.utxos[0].amount >= selection.utxos[99].amount);
    }

    #[test]
    fn collect_all_when_fewer_than_max() {
        let mut set = set_at(100);
        set.add(vec![
            utxo(1, 0, 1_000, 50, false),
            utxo(2, 0, 2_000, 50, false),
        ]);
        let selection = set.collect_utxos(100).unwrap();
        assert_eq!(selection.utxos.len(), 2);
        assert_eq!(selection.total_amount, 3_000);
    }

    // --- used / in-use lifecycle ---

    #[test]
    fn update_used_moves_and_reserves() {
        let mut set = set_at(100);
        let spent = utxo(1, 0, 10_000, 50, false);
        set.add(vec![spent.clone()]);

        set.update_used(&[spent.clone()]);
        assert_eq!(set.confirmed_count(), 0);
        assert_eq!(set.used_count(), 1);
        assert!(set.is_in_use(&spent.outpoint));
        assert_eq!(set.balance().available, 0);
        set.assert_consistent();
    }

    #[test]
    fn clear_used_empties_both() {
        let mut set = set_at(100);
        let spent = utxo(1, 0, 10_000, 50, false);
        set.add(vec![spent.clone()]);
        set.update_used(&[spent.clone()]);

        set.clear_used();
        assert_eq!(set.used_count(), 0);
        assert!(!set.is_in_use(&spent.outpoint));
        set.assert_consistent();
    }

    // --- clear_missing ---

    #[test]
    fn clear_missing_drops_stale_entries() {
        let mut set = set_at(100);
        let keep = utxo(1, 0, 10_000, 50, false);
        let stale = utxo(2, 0, 5_000, 50, false);
        set.add(vec![keep.clone(), stale.clone()]);

        let live: HashSet<TransactionOutpoint> = [keep.outpoint.clone()].into_iter().collect();
        let dropped = set.clear_missing(&live);
        assert_eq!(dropped, 1);
        assert_eq!(set.confirmed_count(), 1);
        assert_eq!(set.balance().available, 10_000);
        set.assert_consistent();
    }

    #[test]
    fn clear_missing_covers_used() {
        let mut set = set_at(100);
        let spent = utxo(1, 0, 10_000, 50, false);
        set.add(vec![spent.clone()]);
        set.update_used(&[spent]);

        let dropped = set.clear_missing(&HashSet::new());
        assert_eq!(dropped, 1);
        assert_eq!(set.used_count(), 0);
        set.assert_consistent();
    }

    // --- addresses index ---

    #[test]
    fn addresses_reflect_tracked_outpoints() {
        let mut set = set_at(100);
        let a = utxo(1, 0, 10_000, 50, false);
        set.add(vec![a.clone()]);
        assert_eq!(set.addresses(), vec![a.address.clone()]);

        set.remove(&[a.outpoint]);
        assert!(set.addresses().is_empty());
    }

    // --- notification idempotence ---

    #[test]
    fn applying_same_notification_twice_is_stable() {
        let added = vec![utxo(1, 0, 10_000, 50, false), utxo(2, 0, 5_000, 100, false)];
        let removed = vec![utxo(3, 0, 1_000, 50, false).outpoint];

        let apply = |set: &mut UtxoSet| {
            set.add(added.clone());
            set.remove(&removed);
        };

        let mut set = set_at(100);
        apply(&mut set);
        let balance_once = set.balance();
        apply(&mut set);
        assert_eq!(set.balance(), balance_once);
        assert_eq!(set.confirmed_count(), 1);
        assert_eq!(set.pending_count(), 1);
        set.assert_consistent();
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(u8, u32, u64, u64, bool),
            Remove(u8, u32),
            BlueScore(u64),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..8, 0u32..4, 1u64..50_000, 0u64..300, any::<bool>())
                    .prop_map(|(t, i, a, b, c)| Op::Add(t, i, a, b, c)),
                (0u8..8, 0u32..4).prop_map(|(t, i)| Op::Remove(t, i)),
                (0u64..400).prop_map(Op::BlueScore),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            /// Any interleaving of adds, removes, and blue-score moves keeps
            /// the collections disjoint, the address index consistent, and
            /// the balance counters exact.
            #[test]
            fn invariants_hold_under_any_op_sequence(ops in prop::collection::vec(op_strategy(), 0..40)) {
                let mut set = set_at(100);
                for op in ops {
                    match op {
                        Op::Add(t, i, a, b, c) => {
                            set.add(vec![utxo(t, i, a, b, c)]);
                        }
                        Op::Remove(t, i) => {
                            set.remove(&[TransactionOutpoint::new(TransactionId([t; 32]), i)]);
                        }
                        Op::BlueScore(score) => {
                            set.update_blue_score(score);
                        }
                    }
                    set.assert_consistent();
                }
            }

            /// Confirmed membership is exactly the maturity rule.
            #[test]
            fn confirmed_iff_mature(score in 0u64..300, born in 0u64..300, coinbase in any::<bool>()) {
                let mut set = set_at(score);
                let entry = utxo(1, 0, 1_000, born, coinbase);
                let mature = entry.is_mature_at(
                    score,
                    NetworkType::Testnet.coinbase_maturity(),
                    NetworkType::Testnet.standard_maturity(),
                );
                set.add(vec![entry]);
                prop_assert_eq!(set.confirmed_count() == 1, mature);
                prop_assert_eq!(set.pending_count() == 1, !mature);
            }
        }
    }
}
