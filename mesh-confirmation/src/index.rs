//! Transaction index service
//!
//! Maintains the totally ordered index chain. Each entry binds an index to a
//! transaction hash and to an accumulated hash covering the whole prefix, so
//! any two nodes holding the same last entry agree on the entire history.
//!
//! Insertions are strictly sequential: an entry is accepted only at the next
//! expected index. Claims ahead of the chain are deferred to the caller,
//! claims behind it are protocol violations.

use std::sync::Arc;

use mesh_ledger::crypto::{accumulated_hash, genesis_accumulated_hash};
use mesh_ledger::types::{Hash, IndexEntry};
use mesh_ledger::Storage;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Outcome of an insertion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry extended the chain
    Inserted,

    /// The claimed index is ahead of the chain; nothing was written
    Deferred,
}

/// Appends index entries in strictly increasing order
pub struct TransactionIndexService {
    /// Durable store the chain is persisted to
    storage: Arc<Storage>,

    /// Newest verified entry, None while the chain is empty
    last_entry: Mutex<Option<IndexEntry>>,
}

impl TransactionIndexService {
    /// Create a service over an empty chain
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            last_entry: Mutex::new(None),
        }
    }

    /// Next index the chain will accept
    pub fn expected_index(&self) -> u64 {
        match self.last_entry.lock().as_ref() {
            Some(entry) => entry.index + 1,
            None => 0,
        }
    }

    /// Index of the newest chain entry, if any
    pub fn last_index(&self) -> Option<u64> {
        self.last_entry.lock().as_ref().map(|entry| entry.index)
    }

    /// Install a high-water mark recovered from storage
    pub fn install_last_entry(&self, entry: Option<IndexEntry>) {
        *self.last_entry.lock() = entry;
    }

    /// Try to extend the chain with `transaction_hash` at `claimed_index`
    ///
    /// Exactly at the expected index the entry is persisted and the chain
    /// advances. Ahead of it the call returns [`InsertOutcome::Deferred`]
    /// with no state change. Behind it the claim is a duplicate of an index
    /// the chain has already assigned and the call fails.
    pub fn insert(&self, transaction_hash: &Hash, claimed_index: u64) -> Result<InsertOutcome> {
        let mut last = self.last_entry.lock();

        let (expected, previous_hash) = match last.as_ref() {
            Some(entry) => (entry.index + 1, entry.accumulated_hash),
            None => (0, genesis_accumulated_hash()),
        };

        if claimed_index < expected {
            return Err(Error::IndexBehind {
                claimed: claimed_index,
                expected,
            });
        }
        if claimed_index > expected {
            return Ok(InsertOutcome::Deferred);
        }

        let entry = IndexEntry {
            index: claimed_index,
            transaction_hash: *transaction_hash,
            accumulated_hash: accumulated_hash(&previous_hash, transaction_hash, claimed_index),
        };
        self.storage.put_index_entry(&entry)?;
        *last = Some(entry);

        Ok(InsertOutcome::Inserted)
    }

    /// Accumulated hash stored at `index`, if that entry exists
    pub fn accumulated_hash_at(&self, index: u64) -> Result<Option<Hash>> {
        Ok(self
            .storage
            .get_index_entry(index)?
            .map(|entry| entry.accumulated_hash))
    }
}
