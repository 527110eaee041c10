//! Typed wallet event stream.
//!
//! The wallet publishes every observable state change through a single
//! [`EventEmitter`] backed by a tokio broadcast channel. Subscribing returns
//! the receiver, which doubles as the listener handle: dropping it
//! unregisters the listener. Emission is synchronous and never blocks the
//! wallet; events published with no live listener are discarded.

use tokio::sync::broadcast;

use kaslite_core::Address;

use crate::addresses::AddressKind;
use crate::store::TransactionRecord;
use crate::utxo::Balance;

/// Channel capacity before slow listeners start lagging.
const EVENT_CAPACITY: usize = 256;

/// Summary published once a sync completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletReadyInfo {
    /// Spendable confirmed balance in sompi.
    pub available: u64,
    /// Immature pending balance in sompi.
    pub pending: u64,
    /// Confirmed plus pending.
    pub total: u64,
    /// Number of confirmed UTXOs tracked.
    pub confirmed_utxos_count: usize,
}

/// Events emitted by the wallet.
#[derive(Debug, Clone)]
pub enum WalletEvent {
    /// The RPC transport came up.
    ApiConnect,
    /// The RPC transport went down.
    ApiDisconnect,
    /// A sync pass started.
    SyncStart,
    /// A sync pass finished.
    SyncFinish,
    /// The wallet is synced and ready for use.
    Ready(WalletReadyInfo),
    /// The aggregate balance changed.
    BalanceUpdate(Balance),
    /// The virtual selected parent blue score advanced.
    BlueScoreChanged(u64),
    /// A fresh address was reserved on one of the chains.
    NewAddress {
        /// The newly reserved address.
        address: Address,
        /// Which chain it belongs to.
        kind: AddressKind,
    },
    /// A transaction relevant to this wallet was recorded.
    StateUpdate(TransactionRecord),
    /// Diagnostic information for consumers that want it.
    DebugInfo(String),
}

/// Publish side of the wallet event stream. Cheap to clone.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: broadcast::Sender<WalletEvent>,
}

impl EventEmitter {
    /// Create an emitter with the default channel capacity.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Register a listener. The receiver is the handle: drop it to
    /// unregister.
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send with no live listeners is not an error.
    pub fn emit(&self, event: WalletEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
