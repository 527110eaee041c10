//! The node RPC client interface the wallet consumes.
//!
//! The transport itself (gRPC, websockets, ...) lives outside this crate;
//! the wallet only depends on [`RpcApi`]. Request/response methods resolve
//! once the server answers. Subscription methods resolve on server ack with
//! a [`Subscription`]: an mpsc receiver of notifications plus the `uid`
//! handle used to cancel that one subscription without tearing down the
//! transport. Connection lifecycle is surfaced as a broadcast of
//! [`ConnectionEvent`]s.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use kaslite_core::{
    Address, SubmitTransactionRequest, TransactionId, TransactionOutpoint, UtxoEntry,
};

/// Errors surfaced by the RPC client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// No transport is established.
    #[error("not connected")]
    NotConnected,
    /// Transport-level failure.
    #[error("transport: {0}")]
    Transport(String),
    /// The server reported an error.
    #[error("server: {0}")]
    Server(String),
    /// A notification stream ended unexpectedly.
    #[error("notification channel closed")]
    ChannelClosed,
    /// No subscription is registered under the given uid.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),
}

/// Transport lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport came up.
    Connected,
    /// The transport went down.
    Disconnected,
}

/// A served subscription: notifications plus the cancellation handle.
///
/// Awaiting the subscribe call is the server ack; the `uid` identifies the
/// subscription for [`RpcApi::unsubscribe`].
#[derive(Debug)]
pub struct Subscription<T> {
    /// Handle for per-subscription cancellation.
    pub uid: String,
    /// The notification stream.
    pub receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Receive the next notification; `None` when the stream ended.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

/// A `utxosChanged` notification: additions applied before removals, so an
/// add+remove of the same outpoint in one message nets to a remove.
#[derive(Debug, Clone, Default)]
pub struct UtxosChangedNotification {
    /// Newly visible outputs for watched addresses.
    pub added: Vec<UtxoEntry>,
    /// Outpoints no longer unspent.
    pub removed: Vec<TransactionOutpoint>,
}

/// A virtual selected parent blue score change.
#[derive(Debug, Clone, Copy)]
pub struct BlueScoreChangedNotification {
    /// The new blue score.
    pub blue_score: u64,
}

/// A block accepted by the node.
#[derive(Debug, Clone)]
pub struct BlockAddedNotification {
    /// Block hash as hex.
    pub hash: String,
    /// Blue score of the block.
    pub blue_score: u64,
    /// Ids of the transactions the block carries.
    pub transaction_ids: Vec<TransactionId>,
}

/// A chain reorganization event.
#[derive(Debug, Clone)]
pub struct ChainChangedNotification {
    /// Hashes added to the selected chain.
    pub added_chain_block_hashes: Vec<String>,
    /// Hashes removed from the selected chain.
    pub removed_chain_block_hashes: Vec<String>,
}

/// A block looked up by hash. Exposed for completeness; the wallet core
/// does not consume it.
#[derive(Debug, Clone)]
pub struct RpcBlock {
    /// Block hash as hex.
    pub hash: String,
    /// Blue score of the block.
    pub blue_score: u64,
    /// Ids of the transactions the block carries.
    pub transaction_ids: Vec<TransactionId>,
}

/// The RPC surface the wallet consumes.
#[async_trait]
pub trait RpcApi: Send + Sync {
    /// Establish the transport.
    async fn connect(&self) -> Result<(), RpcError>;

    /// Tear down the transport.
    async fn disconnect(&self) -> Result<(), RpcError>;

    /// Lifecycle events. Subscribing is cheap; drop the receiver to stop
    /// listening.
    fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Block lookup by hash.
    async fn get_block(&self, hash: &str) -> Result<RpcBlock, RpcError>;

    /// All unspent outputs of the given addresses, grouped per address.
    async fn get_utxos_by_addresses(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Vec<UtxoEntry>>, RpcError>;

    /// Submit a transaction. `Ok(None)` is a soft failure: the server
    /// acknowledged without returning a transaction id.
    async fn submit_transaction(
        &self,
        request: SubmitTransactionRequest,
    ) -> Result<Option<TransactionId>, RpcError>;

    /// Current virtual selected parent blue score.
    async fn get_virtual_selected_parent_blue_score(&self) -> Result<u64, RpcError>;

    /// Stream of accepted blocks.
    async fn subscribe_block_added(
        &self,
    ) -> Result<Subscription<BlockAddedNotification>, RpcError>;

    /// Stream of blue score changes.
    async fn subscribe_virtual_selected_parent_blue_score_changed(
        &self,
    ) -> Result<Subscription<BlueScoreChangedNotification>, RpcError>;

    /// Stream of UTXO changes for the given addresses.
    async fn subscribe_utxos_changed(
        &self,
        addresses: &[Address],
    ) -> Result<Subscription<UtxosChangedNotification>, RpcError>;

    /// Stream of chain reorganization events.
    async fn subscribe_chain_changed(
        &self,
    ) -> Result<Subscription<ChainChangedNotification>, RpcError>;

    /// Cancel one subscription by its uid.
    async fn unsubscribe(&self, uid: &str) -> Result<(), RpcError>;
}
