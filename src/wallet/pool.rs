//! The four wallet-transaction pools and their ordered membership (spec.md
//! §3, §9: transactions are interned once and moved between pools by
//! reference, never copied).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::blockchain::Transaction;
use crate::crypto::hash::Hash256;

/// A pool entry: the shared transaction plus, for confirmed entries, which
/// of its own paying outputs have already been spent by another confirmed
/// transaction.
#[derive(Clone)]
pub struct PoolEntry {
    pub tx: Arc<Transaction>,
    pub spent_outputs: HashSet<u32>,
}

impl PoolEntry {
    pub fn new(tx: Arc<Transaction>) -> Self {
        Self {
            tx,
            spent_outputs: HashSet::new(),
        }
    }
}

/// An insertion-ordered map from txid to [`PoolEntry`]. Order matters for
/// `unspent`, whose iteration order drives coin selection (spec.md §9 Open
/// Question, resolved to insertion order).
#[derive(Default)]
pub struct Pool {
    entries: HashMap<Hash256, PoolEntry>,
    order: Vec<Hash256>,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn insert(&mut self, txid: Hash256, entry: PoolEntry) {
        if !self.entries.contains_key(&txid) {
            self.order.push(txid);
        }
        self.entries.insert(txid, entry);
    }

    pub fn remove(&mut self, txid: &Hash256) -> Option<PoolEntry> {
        let removed = self.entries.remove(txid);
        if removed.is_some() {
            self.order.retain(|h| h != txid);
        }
        removed
    }

    pub fn get(&self, txid: &Hash256) -> Option<&PoolEntry> {
        self.entries.get(txid)
    }

    pub fn get_mut(&mut self, txid: &Hash256) -> Option<&mut PoolEntry> {
        self.entries.get_mut(txid)
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (&Hash256, &PoolEntry)> {
        self.order.iter().map(move |h| (h, self.entries.get(h).expect("order/entries desync")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &PoolEntry)> {
        self.entries.iter()
    }
}
