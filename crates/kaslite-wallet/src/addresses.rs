//! Receive/change address chains with gap-limit discovery support.
//!
//! Each chain is an advancing counter with a cursor: `counter` is the
//! highest reserved leaf index (the active address), `cursor` tracks which
//! index consumers treat as current, and the derived cache is a contiguous
//! run of addresses starting at index 0. Reserving a fresh index emits a
//! `new-address` event so the wallet can start watching it; deriving ahead
//! for a discovery window reserves nothing and emits nothing.

use serde::{Deserialize, Serialize};
use std::fmt;

use kaslite_core::Address;

use crate::error::WalletError;
use crate::events::{EventEmitter, WalletEvent};
use crate::keys::{DerivedAddress, KeyChain};

/// Which of the two HD chains an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// External chain for incoming payments.
    Receive,
    /// Internal chain for transaction change.
    Change,
}

impl AddressKind {
    /// The BIP-44 chain node index: 0 for receive, 1 for change.
    pub fn chain_index(&self) -> u32 {
        match self {
            Self::Receive => 0,
            Self::Change => 1,
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Receive => f.write_str("receive"),
            Self::Change => f.write_str("change"),
        }
    }
}

/// One advancing address chain.
///
/// Invariants: `cursor <= counter`, and the derived cache holds `index == i`
/// at position `i` for a contiguous prefix covering at least `0..=counter`.
#[derive(Debug)]
struct AddressChain {
    /// Highest reserved index; the active address of the chain.
    counter: u32,
    /// Index consumers treat as current.
    cursor: u32,
    /// Indices below this have been announced with `new-address`. Kept
    /// separate from the derived cache so a discovery window (derived but
    /// unreserved) is still announced when it is first reserved, while an
    /// index rolled back by `reverse()` is not announced twice.
    announced: u32,
    /// Contiguous derived prefix. May extend past `counter` when discovery
    /// windows or a `reverse()` have derived ahead.
    derived: Vec<DerivedAddress>,
}

impl AddressChain {
    fn address_at(&self, index: u32) -> &Address {
        &self.derived[index as usize].address
    }
}

/// Manages the receive and change chains of a wallet.
pub struct AddressManager {
    keys: KeyChain,
    receive: AddressChain,
    change: AddressChain,
    events: EventEmitter,
}

impl AddressManager {
    /// Create a manager over a keychain, deriving index 0 on both chains.
    pub fn new(mut keys: KeyChain, events: EventEmitter) -> Result<Self, WalletError> {
        let receive = AddressChain {
            counter: 0,
            cursor: 0,
            announced: 1,
            derived: vec![keys.derive_address(AddressKind::Receive, 0)?],
        };
        let change = AddressChain {
            counter: 0,
            cursor: 0,
            announced: 1,
            derived: vec![keys.derive_address(AddressKind::Change, 0)?],
        };
        Ok(Self {
            keys,
            receive,
            change,
            events,
        })
    }

    /// The active address of a chain (at the cursor).
    pub fn current(&self, kind: AddressKind) -> &Address {
        let chain = self.chain(kind);
        chain.address_at(chain.cursor)
    }

    /// Highest reserved index of a chain.
    pub fn counter(&self, kind: AddressKind) -> u32 {
        self.chain(kind).counter
    }

    /// Cursor of a chain.
    pub fn cursor(&self, kind: AddressKind) -> u32 {
        self.chain(kind).cursor
    }

    /// Reserve and return the next unused address on a chain.
    ///
    /// Emits `new-address` for every index reserved for the first time; an
    /// index re-served after [`reverse`](Self::reverse) was announced the
    /// first time around and stays silent.
    pub fn next(&mut self, kind: AddressKind) -> Result<Address, WalletError> {
        let target = self
            .chain(kind)
            .counter
            .checked_add(1)
            .ok_or_else(|| WalletError::KeyDerivation("address index overflow".into()))?;
        self.derive_to(kind, target)?;
        self.announce_to(kind, target);
        let chain = self.chain_mut(kind);
        chain.counter = target;
        chain.cursor = target;
        Ok(chain.address_at(target).clone())
    }

    /// Move a chain's counter forward by `n` indices unconditionally,
    /// deriving (and announcing) any fresh addresses. Cursor follows.
    pub fn advance(&mut self, kind: AddressKind, n: u32) -> Result<(), WalletError> {
        let target = self
            .chain(kind)
            .counter
            .checked_add(n)
            .ok_or_else(|| WalletError::KeyDerivation("address index overflow".into()))?;
        self.derive_to(kind, target)?;
        self.announce_to(kind, target);
        let chain = self.chain_mut(kind);
        chain.counter = target;
        chain.cursor = target;
        Ok(())
    }

    /// Advance a chain so its counter reaches `index`. No-op when the
    /// chain is already at or past it.
    pub fn advance_to(&mut self, kind: AddressKind, index: u32) -> Result<(), WalletError> {
        let counter = self.chain(kind).counter;
        if index > counter {
            self.advance(kind, index - counter)?;
        }
        Ok(())
    }

    /// Roll back the most recent reservation on a chain.
    ///
    /// Used to avoid burning a change index when a transaction build fails
    /// after deriving its change address. The derived cache is retained, so
    /// the next reservation re-serves the same index.
    pub fn reverse(&mut self, kind: AddressKind) {
        let chain = self.chain_mut(kind);
        chain.counter = chain.counter.saturating_sub(1);
        chain.cursor = chain.cursor.min(chain.counter);
    }

    /// Derive (without reserving) `n` addresses at `[offset..offset+n)` on
    /// a chain. The discovery-window primitive: emits nothing.
    pub fn get_addresses(
        &mut self,
        kind: AddressKind,
        n: u32,
        offset: u32,
    ) -> Result<Vec<Address>, WalletError> {
        let end = offset
            .checked_add(n)
            .ok_or_else(|| WalletError::KeyDerivation("address index overflow".into()))?;
        if end > 0 {
            self.derive_to(kind, end - 1)?;
        }
        let chain = self.chain(kind);
        Ok((offset..end).map(|i| chain.address_at(i).clone()).collect())
    }

    /// Membership check over every derived address on either chain.
    pub fn is_our(&self, address: &Address) -> Option<AddressKind> {
        self.keys.position_of(address).map(|(kind, _)| kind)
    }

    /// Every derived address on both chains, receive chain first.
    pub fn all_addresses(&self) -> Vec<Address> {
        self.receive
            .derived
            .iter()
            .chain(self.change.derived.iter())
            .map(|d| d.address.clone())
            .collect()
    }

    /// The underlying keychain (for signing-key lookups).
    pub fn keychain(&self) -> &KeyChain {
        &self.keys
    }

    fn chain(&self, kind: AddressKind) -> &AddressChain {
        match kind {
            AddressKind::Receive => &self.receive,
            AddressKind::Change => &self.change,
        }
    }

    fn chain_mut(&mut self, kind: AddressKind) -> &mut AddressChain {
        match kind {
            AddressKind::Receive => &mut self.receive,
            AddressKind::Change => &mut self.change,
        }
    }

    /// Derive every missing index up to and including `index` silently.
    fn derive_to(&mut self, kind: AddressKind, index: u32) -> Result<(), WalletError> {
        while (self.chain(kind).derived.len() as u32) <= index {
            let next_index = self.chain(kind).derived.len() as u32;
            let derived = self.keys.derive_address(kind, next_index)?;
            self.chain_mut(kind).derived.push(derived);
        }
        Ok(())
    }

    /// Announce every not-yet-announced index up to and including `index`.
    /// Callers must have derived that far already.
    fn announce_to(&mut self, kind: AddressKind, index: u32) {
        while self.chain(kind).announced <= index {
            let next = self.chain(kind).announced;
            let address = self.chain(kind).address_at(next).clone();
            self.events.emit(WalletEvent::NewAddress { address, kind });
            self.chain_mut(kind).announced = next + 1;
        }
    }
}

impl fmt::Debug for AddressManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressManager")
            .field("receive_counter", &self.receive.counter)
            .field("change_counter", &self.change.counter)
            .field(
                "derived",
                &(self.receive.derived.len() + self.change.derived.len()),
            )
            .finish()
    }
}
