//! Append-only log of transactions relevant to this wallet.
//!
//! Records are keyed by transaction id and kept in insertion order.
//! Persistence goes through the [`RecordStorage`] adapter so callers can
//! pick in-memory (default), a JSON file, or their own backend. Storage
//! failures are surfaced to the caller of `append`/`restore` but the store
//! itself never loses in-memory state over them.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use kaslite_core::{Address, RpcTransaction, TransactionId};

use crate::error::WalletError;

/// Direction of a recorded transaction relative to this wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxDirection {
    /// Funds arriving at one of our addresses.
    In,
    /// Funds leaving the wallet.
    Out,
}

/// One recorded transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Direction relative to this wallet.
    pub direction: TxDirection,
    /// Unix timestamp (seconds) when the record was created.
    pub timestamp: u64,
    /// Transaction id.
    pub txid: TransactionId,
    /// Moved amount in sompi.
    pub amount: u64,
    /// Counterparty address, when known.
    pub address: Option<Address>,
    /// Free-form note.
    pub note: String,
    /// Blue score snapshot at record time.
    pub blue_score: u64,
    /// Wire form of the transaction, when locally originated.
    pub tx: Option<RpcTransaction>,
    /// Whether every output pays back to this wallet (compounding).
    pub self_transfer: bool,
}

impl TransactionRecord {
    /// Current Unix time in seconds.
    pub fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Storage adapter for the transaction log.
pub trait RecordStorage: Send + Sync {
    /// Persist the full record list.
    fn save(&self, records: &[TransactionRecord]) -> Result<(), WalletError>;
    /// Load the persisted record list. An absent backing store is an empty
    /// list, not an error.
    fn load(&self) -> Result<Vec<TransactionRecord>, WalletError>;
}

/// Keep records only in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage;

impl RecordStorage for MemoryStorage {
    fn save(&self, _records: &[TransactionRecord]) -> Result<(), WalletError> {
        Ok(())
    }

    fn load(&self) -> Result<Vec<TransactionRecord>, WalletError> {
        Ok(Vec::new())
    }
}

/// Persist records as a JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Create a file-backed storage at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordStorage for FileStorage {
    fn save(&self, records: &[TransactionRecord]) -> Result<(), WalletError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| WalletError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| WalletError::IoError(e.to_string()))
    }

    fn load(&self) -> Result<Vec<TransactionRecord>, WalletError> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WalletError::IoError(e.to_string())),
        };
        serde_json::from_slice(&data)
            .map_err(|e| WalletError::CorruptedData(format!("transaction log: {e}")))
    }
}

/// The append-only transaction log.
pub struct TxStore {
    records: Vec<TransactionRecord>,
    storage: Box<dyn RecordStorage>,
}

impl TxStore {
    /// Create a store over the given storage adapter.
    pub fn new(storage: Box<dyn RecordStorage>) -> Self {
        Self {
            records: Vec::new(),
            storage,
        }
    }

    /// Create an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage))
    }

    /// Append a record unless its txid is already present, then persist.
    /// Returns whether the record was new.
    pub fn append(&mut self, record: TransactionRecord) -> Result<bool, WalletError> {
        if self.contains(&record.txid) {
            return Ok(false);
        }
        self.records.push(record);
        self.storage.save(&self.records)?;
        Ok(true)
    }

    /// Load persisted records, replacing in-memory state, and return them
    /// for replay.
    pub fn restore(&mut self) -> Result<Vec<TransactionRecord>, WalletError> {
        self.records = self.storage.load()?;
        Ok(self.records.clone())
    }

    /// Whether a txid is recorded.
    pub fn contains(&self, txid: &TransactionId) -> bool {
        self.records.iter().any(|r| &r.txid == txid)
    }

    /// Look up a record by txid.
    pub fn get(&self, txid: &TransactionId) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| &r.txid == txid)
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove one record by txid (explicit user action only). Returns
    /// whether it was present.
    pub fn prune(&mut self, txid: &TransactionId) -> Result<bool, WalletError> {
        let before = self.records.len();
        self.records.retain(|r| &r.txid != txid);
        let pruned = self.records.len() != before;
        if pruned {
            self.storage.save(&self.records)?;
        }
        Ok(pruned)
    }
}

impl std::fmt::Debug for TxStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxStore")
            .field("records", &self.records.len())
            .finish()
    }
}
