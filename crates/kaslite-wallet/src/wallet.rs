//! Wallet composition and lifecycle orchestration.
//!
//! The [`Wallet`] owns the keychain-backed address manager, the UTXO set,
//! and the transaction log, and bridges node RPC events into them:
//!
//! ```text
//! Disconnected -> Connected -> Syncing -> Steady
//! ```
//!
//! [`Wallet::start`] spawns the long-lived pumps (connection lifecycle,
//! deferred transaction-log replay, fresh-address scanning).
//! [`Wallet::sync`] drives one sync pass: await the transport, fetch and
//! subscribe to the blue score, run gap-limit address discovery, refresh
//! the UTXO view, and (for a continuous sync) subscribe to UTXO changes.
//! Blue-score and discovery errors are logged and the sync continues; the
//! next reconnect retries.
//!
//! All mutations run on one logical executor; the interior mutexes are
//! never held across an await point.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use kaslite_core::constants::{DEFAULT_FEE_PER_BYTE, DEFAULT_GAP_LIMIT};
use kaslite_core::{Address, NetworkType, TransactionId, UtxoEntry};

use crate::addresses::{AddressKind, AddressManager};
use crate::builder::{ComposedTransaction, SendRequest, TxBuilder};
use crate::encryption::{decrypt_export, encrypt_export, SeedExport};
use crate::error::WalletError;
use crate::events::{EventEmitter, WalletEvent, WalletReadyInfo};
use crate::keys::KeyChain;
use crate::mnemonic;
use crate::rpc::{ConnectionEvent, RpcApi, UtxosChangedNotification};
use crate::store::{MemoryStorage, RecordStorage, TransactionRecord, TxDirection, TxStore};
use crate::utxo::{Balance, UtxoSet};

/// Tunables for a wallet instance.
#[derive(Debug, Clone)]
pub struct WalletOptions {
    /// Gap limit for address discovery.
    pub gap_limit: u32,
    /// Fee rate in sompi per serialized byte.
    pub fee_per_byte: u64,
    /// Skip address discovery during sync.
    pub disable_address_discovery: bool,
}

impl Default for WalletOptions {
    fn default() -> Self {
        Self {
            gap_limit: DEFAULT_GAP_LIMIT,
            fee_per_byte: DEFAULT_FEE_PER_BYTE,
            disable_address_discovery: false,
        }
    }
}

/// Sync lifecycle flags, guarded together.
#[derive(Debug, Default)]
struct SyncState {
    /// A sync pass is currently executing.
    in_progress: bool,
    /// A continuous sync finished and its subscriptions are live.
    continuous_active: bool,
    /// At least one sync completed since construction.
    completed: bool,
    /// The blue-score subscription is established.
    blue_score_synced: bool,
    /// Cancellation handle of the blue-score subscription.
    blue_score_sub_uid: Option<String>,
    /// Cancellation handle of the utxos-changed subscription.
    utxo_sub_uid: Option<String>,
}

/// An HD wallet over a node RPC connection.
pub struct Wallet {
    rpc: Arc<dyn RpcApi>,
    network: NetworkType,
    options: WalletOptions,
    addresses: Mutex<AddressManager>,
    utxos: Mutex<UtxoSet>,
    store: Mutex<TxStore>,
    events: EventEmitter,
    blue_score: AtomicU64,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    sync_state: Mutex<SyncState>,
    last_balance: Mutex<Option<Balance>>,
    balance_notifications_disabled: AtomicBool,
    uid: String,
}

impl Wallet {
    /// Create a wallet with a freshly generated mnemonic.
    pub fn create(
        rpc: Arc<dyn RpcApi>,
        network: NetworkType,
        options: WalletOptions,
    ) -> Result<Arc<Self>, WalletError> {
        Self::from_mnemonic(rpc, &mnemonic::generate_phrase(), network, options)
    }

    /// Create a wallet from an existing mnemonic phrase.
    pub fn from_mnemonic(
        rpc: Arc<dyn RpcApi>,
        phrase: &str,
        network: NetworkType,
        options: WalletOptions,
    ) -> Result<Arc<Self>, WalletError> {
        Self::with_storage(rpc, phrase, network, options, Box::new(MemoryStorage))
    }

    /// Import a wallet from an encrypted seed export.
    pub fn from_encrypted(
        rpc: Arc<dyn RpcApi>,
        data: &[u8],
        password: &[u8],
        network: NetworkType,
        options: WalletOptions,
    ) -> Result<Arc<Self>, WalletError> {
        let export = decrypt_export(data, password)?;
        Self::from_mnemonic(rpc, &export.seed_phrase, network, options)
    }

    /// Create a wallet with an explicit transaction-log storage adapter.
    pub fn with_storage(
        rpc: Arc<dyn RpcApi>,
        phrase: &str,
        network: NetworkType,
        options: WalletOptions,
        storage: Box<dyn RecordStorage>,
    ) -> Result<Arc<Self>, WalletError> {
        let keys = KeyChain::from_phrase(phrase, network)?;
        let uid = keys.uid().to_string();
        let events = EventEmitter::new();
        let addresses = AddressManager::new(keys, events.clone())?;
        let (connected_tx, connected_rx) = watch::channel(false);

        Ok(Arc::new(Self {
            rpc,
            network,
            options,
            addresses: Mutex::new(addresses),
            utxos: Mutex::new(UtxoSet::new(network)),
            store: Mutex::new(TxStore::new(storage)),
            events,
            blue_score: AtomicU64::new(0),
            connected_tx,
            connected_rx,
            sync_state: Mutex::new(SyncState::default()),
            last_balance: Mutex::new(None),
            balance_notifications_disabled: AtomicBool::new(false),
            uid,
        }))
    }

    // --- Accessors ---

    /// The stable wallet identifier.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The network this wallet operates on.
    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// Register an event listener. Drop the receiver to unregister.
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    /// Current aggregate balance.
    pub fn balance(&self) -> Balance {
        self.utxos.lock().balance()
    }

    /// Latest known virtual selected parent blue score.
    pub fn blue_score(&self) -> u64 {
        self.blue_score.load(Ordering::SeqCst)
    }

    /// Whether the transport is currently up.
    pub fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }

    /// The active receive address.
    pub fn receive_address(&self) -> Address {
        self.addresses.lock().current(AddressKind::Receive).clone()
    }

    /// Reserve and return a fresh receive address.
    pub fn new_receive_address(&self) -> Result<Address, WalletError> {
        self.addresses.lock().next(AddressKind::Receive)
    }

    /// All recorded transactions in insertion order.
    pub fn transaction_records(&self) -> Vec<TransactionRecord> {
        self.store.lock().records().to_vec()
    }

    /// Drop the spent-output bookkeeping and reservations.
    pub fn clear_used(&self) {
        self.utxos.lock().clear_used();
    }

    /// Encrypt the seed export (`{ privKey, seedPhrase }`) under a
    /// password. The returned blob is the only durable secret.
    pub fn export_encrypted(&self, password: &[u8]) -> Result<Vec<u8>, WalletError> {
        let addresses = self.addresses.lock();
        let keychain = addresses.keychain();
        let export = SeedExport {
            priv_key: keychain.master_xprv_string(),
            seed_phrase: keychain.phrase().to_string(),
        };
        encrypt_export(&export, password)
    }

    // --- Lifecycle ---

    /// Spawn the long-lived pumps: connection lifecycle, deferred
    /// transaction-log restore, and fresh-address scanning.
    pub fn start(self: &Arc<Self>) {
        self.spawn_connection_pump();
        self.spawn_restore();
        self.spawn_address_scanner();
    }

    /// Run one sync pass.
    ///
    /// `sync_once` performs a single snapshot sync; otherwise blue-score
    /// and UTXO subscriptions stay live afterwards (steady state). Errors
    /// with [`WalletError::SyncInProgress`] when a sync is executing or a
    /// continuous sync is already active.
    pub async fn sync(self: &Arc<Self>, sync_once: bool) -> Result<(), WalletError> {
        self.wait_connected().await;

        {
            let mut state = self.sync_state.lock();
            if state.in_progress || state.continuous_active {
                return Err(WalletError::SyncInProgress);
            }
            state.in_progress = true;
        }

        self.events.emit(WalletEvent::SyncStart);
        let result = self.sync_inner(sync_once).await;

        {
            let mut state = self.sync_state.lock();
            state.in_progress = false;
            if result.is_ok() {
                state.completed = true;
                if !sync_once {
                    state.continuous_active = true;
                }
            }
        }
        result
    }

    /// Cancel the live subscriptions without tearing down the transport.
    pub async fn stop_subscriptions(&self) {
        let (blue_uid, utxo_uid) = {
            let mut state = self.sync_state.lock();
            state.continuous_active = false;
            state.blue_score_synced = false;
            (state.blue_score_sub_uid.take(), state.utxo_sub_uid.take())
        };
        for uid in [blue_uid, utxo_uid].into_iter().flatten() {
            if let Err(e) = self.rpc.unsubscribe(&uid).await {
                debug!(%uid, "unsubscribe failed: {e}");
            }
        }
    }

    // --- Transactions ---

    /// Estimate a transaction without submitting it. The change index
    /// reserved by the estimate stays reserved on success; every failure
    /// path rolls it back.
    pub fn estimate_transaction(
        &self,
        request: &SendRequest,
    ) -> Result<ComposedTransaction, WalletError> {
        let mut addresses = self.addresses.lock();
        let utxos = self.utxos.lock();
        let mut builder = TxBuilder::new(&utxos, &mut addresses, self.options.fee_per_byte);
        builder.estimate_transaction(request)
    }

    /// Build, sign, and submit a transaction.
    ///
    /// On acceptance the consumed outputs move into the spent bookkeeping,
    /// a record is appended to the transaction log with the current
    /// blue-score snapshot, and `state-update` is emitted. `Ok(None)`
    /// signals a soft failure (the node acknowledged without a txid); no
    /// reservation or record is made in that case.
    pub async fn submit_transaction(
        &self,
        request: &SendRequest,
    ) -> Result<Option<TransactionId>, WalletError> {
        let (composed, wire) = {
            let mut addresses = self.addresses.lock();
            let utxos = self.utxos.lock();
            let mut builder = TxBuilder::new(&utxos, &mut addresses, self.options.fee_per_byte);
            builder.build_transaction(request)?
        };

        let txid = match self.rpc.submit_transaction(wire.clone()).await? {
            Some(txid) => txid,
            None => {
                debug!("transaction submission returned no txid");
                return Ok(None);
            }
        };

        self.utxos.lock().update_used(&composed.utxos);

        let self_transfer = request.compound_max_inputs.is_some()
            || self.addresses.lock().is_our(&request.to).is_some();
        let record = TransactionRecord {
            direction: TxDirection::Out,
            timestamp: TransactionRecord::now(),
            txid,
            amount: composed.amount,
            address: Some(request.to.clone()),
            note: String::new(),
            blue_score: self.blue_score(),
            tx: Some(wire.transaction.clone()),
            self_transfer,
        };
        if let Err(e) = self.store.lock().append(record.clone()) {
            warn!("failed to persist transaction record: {e}");
        }
        self.events.emit(WalletEvent::StateUpdate(record));
        self.emit_balance();

        info!(%txid, amount = composed.amount, fee = composed.fee, "transaction submitted");
        Ok(Some(txid))
    }

    /// Collapse up to `max_inputs` of the largest confirmed UTXOs into one
    /// output on a fresh change address.
    pub async fn compound_utxos(
        &self,
        max_inputs: usize,
    ) -> Result<Option<TransactionId>, WalletError> {
        let target = self.addresses.lock().next(AddressKind::Change)?;
        let mut request = SendRequest::new(target.clone(), 0);
        request.compound_max_inputs = Some(max_inputs);
        request.change_address = Some(target);

        match self.submit_transaction(&request).await {
            Ok(txid) => Ok(txid),
            Err(e) => {
                self.addresses.lock().reverse(AddressKind::Change);
                Err(e)
            }
        }
    }

    // --- Sync phases ---

    async fn sync_inner(self: &Arc<Self>, sync_once: bool) -> Result<(), WalletError> {
        if let Err(e) = self.init_blue_score_sync(sync_once).await {
            warn!("blue score sync failed: {e}; continuing");
        }

        if !self.options.disable_address_discovery {
            if let Err(e) = self.address_discovery(self.options.gap_limit).await {
                warn!("address discovery failed: {e}; continuing");
            }
        }

        if let Err(e) = self.refresh_utxos().await {
            warn!("utxo refresh failed: {e}; continuing");
        }

        if !sync_once {
            if let Err(e) = self.utxo_subscribe().await {
                warn!("utxo subscription failed: {e}; continuing");
            }
        }

        self.events.emit(WalletEvent::SyncFinish);
        let (balance, confirmed_count) = {
            let set = self.utxos.lock();
            (set.balance(), set.confirmed_count())
        };
        self.events.emit(WalletEvent::Ready(WalletReadyInfo {
            available: balance.available,
            pending: balance.pending,
            total: balance.total,
            confirmed_utxos_count: confirmed_count,
        }));
        self.emit_balance();
        self.events.emit(WalletEvent::NewAddress {
            address: self.receive_address(),
            kind: AddressKind::Receive,
        });
        for record in self.transaction_records() {
            self.events.emit(WalletEvent::StateUpdate(record));
        }

        info!(uid = %self.uid, available = balance.available, "wallet sync finished");
        Ok(())
    }

    /// Fetch the current blue score; for a continuous sync also subscribe
    /// to its changes and pump them into balance reclassification.
    async fn init_blue_score_sync(self: &Arc<Self>, sync_once: bool) -> Result<(), WalletError> {
        let score = self.rpc.get_virtual_selected_parent_blue_score().await?;
        self.apply_blue_score(score);

        if sync_once {
            return Ok(());
        }

        let mut subscription = self
            .rpc
            .subscribe_virtual_selected_parent_blue_score_changed()
            .await?;
        {
            let mut state = self.sync_state.lock();
            state.blue_score_synced = true;
            state.blue_score_sub_uid = Some(subscription.uid.clone());
        }

        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                wallet.apply_blue_score(notification.blue_score);
            }
            debug!("blue score subscription ended");
        });
        Ok(())
    }

    fn apply_blue_score(&self, score: u64) {
        self.blue_score.store(score, Ordering::SeqCst);
        self.events.emit(WalletEvent::BlueScoreChanged(score));
        let changed = self.utxos.lock().update_blue_score(score);
        if changed {
            self.emit_balance();
        }
    }

    /// Gap-limit address discovery over both chains.
    ///
    /// Scans windows of `threshold` fresh indices with one batched RPC per
    /// window; any activity pushes the window past the highest active
    /// index. Found outputs enter the set under suppressed balance
    /// notifications; the single emission happens at sync finish.
    async fn address_discovery(&self, threshold: u32) -> Result<(), WalletError> {
        self.balance_notifications_disabled
            .store(true, Ordering::SeqCst);
        let result = self.discover_chains(threshold).await;
        self.balance_notifications_disabled
            .store(false, Ordering::SeqCst);
        result
    }

    async fn discover_chains(&self, threshold: u32) -> Result<(), WalletError> {
        for kind in [AddressKind::Receive, AddressKind::Change] {
            let mut offset = 0u32;
            let mut highest: Option<u32> = None;

            loop {
                let window = self.addresses.lock().get_addresses(kind, threshold, offset)?;
                let by_address = self.rpc.get_utxos_by_addresses(&window).await?;

                let mut active: Option<u32> = None;
                let mut found: Vec<UtxoEntry> = Vec::new();
                for (i, address) in window.iter().enumerate() {
                    match by_address.get(address) {
                        Some(utxos) if !utxos.is_empty() => {
                            active = Some(offset + i as u32);
                            found.extend(utxos.iter().cloned());
                        }
                        _ => {}
                    }
                }

                match active {
                    Some(index) => {
                        highest = Some(index);
                        self.utxos.lock().add(found);
                        offset = index + 1;
                    }
                    None => break,
                }
            }

            if let Some(index) = highest {
                self.addresses.lock().advance_to(kind, index + 1)?;
            }
            debug!(chain = %kind, highest = ?highest, "address discovery finished");
            self.events.emit(WalletEvent::DebugInfo(match highest {
                Some(index) => format!("{kind} chain active up to index {index}"),
                None => format!("{kind} chain has no activity"),
            }));
        }
        Ok(())
    }

    /// Fetch the authoritative UTXO listing for every known address, then
    /// drop tracked entries the node no longer reports.
    async fn refresh_utxos(&self) -> Result<(), WalletError> {
        let addresses = self.addresses.lock().all_addresses();
        if addresses.is_empty() {
            return Ok(());
        }
        let by_address = self.rpc.get_utxos_by_addresses(&addresses).await?;

        let mut live = HashSet::new();
        let mut entries = Vec::new();
        for utxos in by_address.values() {
            for utxo in utxos {
                live.insert(utxo.outpoint.clone());
                entries.push(utxo.clone());
            }
        }

        let mut set = self.utxos.lock();
        set.add(entries);
        set.clear_missing(&live);
        Ok(())
    }

    /// Subscribe to UTXO changes for every known address and pump
    /// notifications into the set.
    async fn utxo_subscribe(self: &Arc<Self>) -> Result<(), WalletError> {
        let addresses = self.addresses.lock().all_addresses();
        let mut subscription = self.rpc.subscribe_utxos_changed(&addresses).await?;
        self.sync_state.lock().utxo_sub_uid = Some(subscription.uid.clone());

        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(notification) = subscription.recv().await {
                wallet.handle_utxos_changed(notification);
            }
            debug!("utxos-changed subscription ended");
        });
        Ok(())
    }

    /// Apply one `utxosChanged` notification atomically: additions first,
    /// then removals, then a single deduplicated balance emission.
    fn handle_utxos_changed(&self, notification: UtxosChangedNotification) {
        // Aggregate incoming value per txid before the entries move.
        let mut incoming: HashMap<TransactionId, (u64, Address)> = HashMap::new();
        for utxo in &notification.added {
            incoming
                .entry(utxo.outpoint.transaction_id)
                .and_modify(|(amount, _)| *amount += utxo.amount)
                .or_insert((utxo.amount, utxo.address.clone()));
        }

        {
            let mut set = self.utxos.lock();
            set.add(notification.added);
            set.remove(&notification.removed);
        }

        // Record observed incoming transfers; append deduplicates, so our
        // own submissions (already recorded as outgoing) are skipped.
        let blue_score = self.blue_score();
        for (txid, (amount, address)) in incoming {
            let record = TransactionRecord {
                direction: TxDirection::In,
                timestamp: TransactionRecord::now(),
                txid,
                amount,
                address: Some(address),
                note: String::new(),
                blue_score,
                tx: None,
                self_transfer: false,
            };
            match self.store.lock().append(record.clone()) {
                Ok(true) => self.events.emit(WalletEvent::StateUpdate(record)),
                Ok(false) => {}
                Err(e) => warn!("failed to persist observed transaction: {e}"),
            }
        }

        self.emit_balance();
    }

    /// Emit `balance-update` unless suppressed or unchanged since the last
    /// emission.
    fn emit_balance(&self) {
        if self.balance_notifications_disabled.load(Ordering::SeqCst) {
            return;
        }
        let balance = self.utxos.lock().balance();
        let mut last = self.last_balance.lock();
        if last.as_ref() == Some(&balance) {
            return;
        }
        *last = Some(balance);
        self.events.emit(WalletEvent::BalanceUpdate(balance));
    }

    async fn wait_connected(&self) {
        let mut rx = self.connected_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    // --- Pumps ---

    fn spawn_connection_pump(self: &Arc<Self>) {
        let wallet = Arc::clone(self);
        let mut events = self.rpc.connection_events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectionEvent::Connected) => {
                        let _ = wallet.connected_tx.send(true);
                        wallet.events.emit(WalletEvent::ApiConnect);

                        let resync = {
                            let state = wallet.sync_state.lock();
                            state.completed && !state.in_progress && !state.continuous_active
                        };
                        if resync {
                            let w = Arc::clone(&wallet);
                            tokio::spawn(async move {
                                if let Err(e) = w.sync(false).await {
                                    warn!("automatic resync failed: {e}");
                                }
                            });
                        }
                    }
                    Ok(ConnectionEvent::Disconnected) => {
                        let _ = wallet.connected_tx.send(false);
                        {
                            let mut state = wallet.sync_state.lock();
                            state.blue_score_synced = false;
                            state.continuous_active = false;
                        }
                        wallet.events.emit(WalletEvent::ApiDisconnect);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "lagged behind on connection events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("connection event channel closed");
                        break;
                    }
                }
            }
        });
    }

    /// Deferred transaction-log restore: load persisted records and replay
    /// them to listeners.
    fn spawn_restore(self: &Arc<Self>) {
        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            let restored = wallet.store.lock().restore();
            match restored {
                Ok(records) => {
                    for record in records {
                        wallet.events.emit(WalletEvent::StateUpdate(record));
                    }
                }
                Err(e) => warn!("transaction log restore failed: {e}"),
            }
        });
    }

    /// Watch our own `new-address` events and scan each fresh address for
    /// existing outputs.
    fn spawn_address_scanner(self: &Arc<Self>) {
        let wallet = Arc::clone(self);
        let mut events = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(WalletEvent::NewAddress { address, .. }) => {
                        if let Err(e) = wallet.scan_addresses(&[address]).await {
                            debug!("fresh address scan failed: {e}");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "lagged behind on wallet events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn scan_addresses(&self, addresses: &[Address]) -> Result<(), WalletError> {
        if !self.is_connected() {
            return Ok(());
        }
        let by_address = self.rpc.get_utxos_by_addresses(addresses).await?;
        let entries: Vec<UtxoEntry> = by_address.into_values().flatten().collect();
        if entries.is_empty() {
            return Ok(());
        }
        self.utxos.lock().add(entries);
        self.emit_balance();
        Ok(())
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("network", &self.network)
            .field("uid", &self.uid)
            .field("blue_score", &self.blue_score())
            .field("connected", &self.is_connected())
            .finish()
    }
}
