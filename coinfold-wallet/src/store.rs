//! Wallet store and chain collaborators
//!
//! The engine reads unspent outputs through [`UnspentStore`], which hands out
//! a read-write [`StoreTxn`]. Deletions staged on a transaction only take
//! effect on [`StoreTxn::commit`]; dropping the transaction discards them.
//!
//! [`MemoryStore`] is an in-memory implementation used by tests and by
//! callers that keep their wallet state elsewhere and load a snapshot.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::ControlFlow;
use std::sync::{Mutex, RwLock};

use bitcoin::{Address, OutPoint};
use log::{debug, trace};

use crate::error::{CoinfoldError, CoinfoldResult, StoreError};
use crate::types::UnspentOutput;

/// Source of read-write transactions over the wallet's unspent outputs
pub trait UnspentStore: Send + Sync {
    /// Open a read-write transaction
    fn begin_rw(&self) -> Result<Box<dyn StoreTxn + '_>, StoreError>;
}

/// A read-write transaction over the unspent output set
pub trait StoreTxn {
    /// Visit unspent outputs in (address, outpoint) order
    ///
    /// When `addresses` is non-empty only outputs owned by those addresses are
    /// visited. Returning `ControlFlow::Break` from the callback ends the scan
    /// early without error. Returns the number of outputs visited.
    fn for_each_unspent(
        &self,
        addresses: &BTreeSet<String>,
        f: &mut dyn FnMut(&UnspentOutput) -> ControlFlow<()>,
    ) -> Result<usize, StoreError>;

    /// Stage removal of an unspent output
    fn delete_unspent(&mut self, outpoint: &OutPoint) -> Result<(), StoreError>;

    /// Apply all staged changes
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

type UnspentKey = (String, OutPoint);

/// In-memory unspent output store
#[derive(Debug, Default)]
pub struct MemoryStore {
    unspent: Mutex<BTreeMap<UnspentKey, UnspentOutput>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding the given outputs
    pub fn with_outputs(outputs: impl IntoIterator<Item = UnspentOutput>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.unspent.lock() {
            for out in outputs {
                map.insert((out.address.clone(), out.outpoint), out);
            }
        }
        store
    }

    /// Add an output, replacing any output with the same owner and outpoint
    pub fn insert(&self, output: UnspentOutput) -> Result<(), StoreError> {
        let mut map = self.lock()?;
        map.insert((output.address.clone(), output.outpoint), output);
        Ok(())
    }

    /// Number of unspent outputs held
    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an output with this outpoint is held
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.lock()
            .map(|m| m.keys().any(|(_, op)| op == outpoint))
            .unwrap_or(false)
    }

    /// Sum of all held output values
    pub fn balance(&self) -> u64 {
        self.lock()
            .map(|m| m.values().map(|o| o.value).sum())
            .unwrap_or(0)
    }

    /// Export all outputs as a JSON array
    pub fn to_json(&self) -> Result<String, StoreError> {
        let map = self.lock()?;
        let outputs: Vec<&UnspentOutput> = map.values().collect();
        Ok(serde_json::to_string_pretty(&outputs)?)
    }

    /// Load a store from a JSON array of outputs
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let outputs: Vec<UnspentOutput> = serde_json::from_str(json)?;
        debug!("Loaded {} unspent outputs from snapshot", outputs.len());
        Ok(Self::with_outputs(outputs))
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<UnspentKey, UnspentOutput>>, StoreError> {
        self.unspent
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl UnspentStore for MemoryStore {
    fn begin_rw(&self) -> Result<Box<dyn StoreTxn + '_>, StoreError> {
        Ok(Box::new(MemoryTxn {
            store: self,
            staged: Vec::new(),
        }))
    }
}

/// Transaction over a [`MemoryStore`]
///
/// Reads see the committed state; staged deletes apply on commit.
pub struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    staged: Vec<OutPoint>,
}

impl StoreTxn for MemoryTxn<'_> {
    fn for_each_unspent(
        &self,
        addresses: &BTreeSet<String>,
        f: &mut dyn FnMut(&UnspentOutput) -> ControlFlow<()>,
    ) -> Result<usize, StoreError> {
        let map = self.store.lock()?;
        let mut visited = 0;
        for ((address, _), output) in map.iter() {
            if !addresses.is_empty() && !addresses.contains(address) {
                continue;
            }
            visited += 1;
            if f(output).is_break() {
                break;
            }
        }
        Ok(visited)
    }

    fn delete_unspent(&mut self, outpoint: &OutPoint) -> Result<(), StoreError> {
        if !self.store.contains(outpoint) {
            return Err(StoreError::NotFound(*outpoint));
        }
        self.staged.push(*outpoint);
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut map = self.store.lock()?;
        let staged: HashSet<OutPoint> = self.staged.into_iter().collect();
        map.retain(|(_, op), _| !staged.contains(op));
        trace!("Committed {} staged deletions", staged.len());
        Ok(())
    }
}

/// Membership test for outputs reserved by other operations
pub trait LockSet: Send + Sync {
    fn is_locked(&self, outpoint: &OutPoint) -> bool;
}

impl LockSet for HashSet<OutPoint> {
    fn is_locked(&self, outpoint: &OutPoint) -> bool {
        self.contains(outpoint)
    }
}

/// Shared, mutable set of locked outpoints
#[derive(Debug, Default)]
pub struct OutpointLocks {
    locked: RwLock<HashSet<OutPoint>>,
}

impl OutpointLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock an outpoint, returning false if it was already locked
    pub fn lock(&self, outpoint: OutPoint) -> bool {
        match self.locked.write() {
            Ok(mut set) => set.insert(outpoint),
            Err(_) => false,
        }
    }

    /// Unlock an outpoint, returning false if it was not locked
    pub fn unlock(&self, outpoint: &OutPoint) -> bool {
        match self.locked.write() {
            Ok(mut set) => set.remove(outpoint),
            Err(_) => false,
        }
    }
}

impl LockSet for OutpointLocks {
    fn is_locked(&self, outpoint: &OutPoint) -> bool {
        // A poisoned lock set reports everything as locked so nothing is double spent
        self.locked
            .read()
            .map(|set| set.contains(outpoint))
            .unwrap_or(true)
    }
}

/// Source of the current best block height
pub trait ChainTip: Send + Sync {
    fn best_height(&self) -> CoinfoldResult<u32>;
}

/// Chain tip pinned at a fixed height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTip(pub u32);

impl ChainTip for FixedTip {
    fn best_height(&self) -> CoinfoldResult<u32> {
        Ok(self.0)
    }
}

/// Registers addresses for transaction notifications
pub trait AddressWatcher: Send + Sync {
    fn watch_addresses(&self, addresses: &[Address]) -> CoinfoldResult<()>;
}

/// Watcher that ignores registrations
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWatcher;

impl AddressWatcher for NoopWatcher {
    fn watch_addresses(&self, _addresses: &[Address]) -> CoinfoldResult<()> {
        Ok(())
    }
}

/// Watcher that records every registered address
#[derive(Debug, Default)]
pub struct RecordingWatcher {
    watched: Mutex<Vec<Address>>,
}

impl RecordingWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses registered so far
    pub fn watched(&self) -> Vec<Address> {
        self.watched.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl AddressWatcher for RecordingWatcher {
    fn watch_addresses(&self, addresses: &[Address]) -> CoinfoldResult<()> {
        let mut watched = self
            .watched
            .lock()
            .map_err(|e| CoinfoldError::Chain(format!("watcher poisoned: {}", e)))?;
        watched.extend(addresses.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::{ScriptBuf, Txid};

    fn out(address: &str, n: u8, value: u64) -> UnspentOutput {
        UnspentOutput::new(
            OutPoint::new(Txid::from_byte_array([n; 32]), 0),
            address,
            value,
            ScriptBuf::new(),
        )
    }

    #[test]
    fn scan_is_ordered_by_address() {
        let store = MemoryStore::with_outputs(vec![out("b", 1, 10), out("a", 2, 20), out("a", 3, 30)]);
        let txn = store.begin_rw().unwrap();
        let mut seen = Vec::new();
        let visited = txn
            .for_each_unspent(&BTreeSet::new(), &mut |o| {
                seen.push(o.address.clone());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(visited, 3);
        assert_eq!(seen, vec!["a", "a", "b"]);
    }

    #[test]
    fn scan_respects_address_filter_and_break() {
        let store = MemoryStore::with_outputs(vec![out("a", 1, 10), out("b", 2, 20), out("b", 3, 30)]);
        let txn = store.begin_rw().unwrap();
        let only_b: BTreeSet<String> = ["b".to_string()].into_iter().collect();
        let visited = txn
            .for_each_unspent(&only_b, &mut |_| ControlFlow::Break(()))
            .unwrap();
        assert_eq!(visited, 1);
    }

    #[test]
    fn deletes_apply_only_on_commit() {
        let store = MemoryStore::with_outputs(vec![out("a", 1, 10), out("a", 2, 20)]);
        let target = OutPoint::new(Txid::from_byte_array([1; 32]), 0);

        {
            let mut txn = store.begin_rw().unwrap();
            txn.delete_unspent(&target).unwrap();
        }
        assert_eq!(store.len(), 2);

        let mut txn = store.begin_rw().unwrap();
        txn.delete_unspent(&target).unwrap();
        txn.commit().unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&target));
    }

    #[test]
    fn deleting_unknown_output_fails() {
        let store = MemoryStore::new();
        let mut txn = store.begin_rw().unwrap();
        let missing = OutPoint::new(Txid::all_zeros(), 9);
        assert!(matches!(txn.delete_unspent(&missing), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn snapshot_round_trips() {
        let store = MemoryStore::with_outputs(vec![out("a", 1, 10).at_height(5).coinbase()]);
        let restored = MemoryStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.balance(), 10);
    }

    #[test]
    fn outpoint_locks() {
        let locks = OutpointLocks::new();
        let op = OutPoint::new(Txid::all_zeros(), 0);
        assert!(locks.lock(op));
        assert!(!locks.lock(op));
        assert!(locks.is_locked(&op));
        assert!(locks.unlock(&op));
        assert!(!locks.is_locked(&op));
    }
}
