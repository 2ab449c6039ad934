//! Account balance tracking with speculative admission
//!
//! Two views are kept per (address, currency) pair:
//!
//! - **durable**: balances from fully confirmed transactions only; changes
//!   exactly once per leg, when a transaction reaches full confirmation
//! - **speculative**: durable plus every admitted-but-unconfirmed
//!   transaction; changes at admission and on rollback
//!
//! Admission is serialized by a single lock, so concurrent submitters see a
//! consistent pair of views and the speculative map never goes negative
//! under any interleaving of admissible requests.

use crate::types::{Address, Hash, TransferLeg};
use crate::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key of one balance entry
pub type BalanceKey = (Address, Hash);

/// One funded (address, currency) pair in a balance snapshot file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Funded address
    pub address: Address,

    /// Funded currency
    pub currency: Hash,

    /// Opening balance
    pub amount: Decimal,
}

/// Dual-view balance ledger
#[derive(Debug, Default)]
pub struct BalanceLedger {
    /// Balances from fully confirmed transactions
    durable: DashMap<BalanceKey, Decimal>,

    /// Durable plus admitted-but-unconfirmed movements
    speculative: DashMap<BalanceKey, Decimal>,

    /// Serializes admission so batches are checked against stable views
    admission: Mutex<()>,
}

impl BalanceLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Durable balance for an address/currency pair, zero if absent
    pub fn balance(&self, address: &Address, currency: &Hash) -> Decimal {
        self.durable
            .get(&(*address, *currency))
            .map(|entry| *entry.value())
            .unwrap_or(Decimal::ZERO)
    }

    /// Speculative balance for an address/currency pair, zero if absent
    pub fn speculative_balance(&self, address: &Address, currency: &Hash) -> Decimal {
        self.speculative
            .get(&(*address, *currency))
            .map(|entry| *entry.value())
            .unwrap_or(Decimal::ZERO)
    }

    /// Check a batch of legs and reserve it in the speculative view
    ///
    /// Every debit leg must keep the durable balance non-negative, checked
    /// against the balance as of batch start, and must keep the speculative
    /// balance non-negative with earlier legs of the same batch already
    /// counted. Returns `false` with no mutation if any leg fails; on
    /// success all legs are applied to the speculative view.
    pub fn reserve(&self, legs: &[TransferLeg]) -> bool {
        let _guard = self.admission.lock();

        let mut staged: HashMap<BalanceKey, Decimal> = HashMap::new();
        for leg in legs {
            let key = (leg.address, leg.currency);

            let durable = self.balance(&leg.address, &leg.currency);
            if durable + leg.amount < Decimal::ZERO {
                tracing::error!(
                    address = %leg.address,
                    currency = %leg.currency,
                    balance = %durable,
                    amount = %leg.amount,
                    "Balance check failed"
                );
                return false;
            }

            let speculative = staged
                .get(&key)
                .copied()
                .unwrap_or_else(|| self.speculative_balance(&leg.address, &leg.currency));
            let next = speculative + leg.amount;
            if next < Decimal::ZERO {
                tracing::error!(
                    address = %leg.address,
                    currency = %leg.currency,
                    pre_balance = %speculative,
                    amount = %leg.amount,
                    "Pre-balance check failed"
                );
                return false;
            }
            staged.insert(key, next);
        }

        for (key, value) in staged {
            self.speculative.insert(key, value);
        }
        true
    }

    /// Reverse a previously reserved batch in the speculative view
    ///
    /// Only touches entries that exist; an absent entry means the leg was
    /// never applied and there is nothing to reverse.
    pub fn rollback(&self, legs: &[TransferLeg]) {
        let _guard = self.admission.lock();

        for leg in legs {
            if let Some(mut entry) = self.speculative.get_mut(&(leg.address, leg.currency)) {
                *entry -= leg.amount;
            }
        }
    }

    /// Apply one confirmed leg to the durable view
    ///
    /// Called exactly once per leg when its transaction reaches full
    /// confirmation. Absent entries are initialized to zero first.
    pub fn commit(&self, address: &Address, currency: &Hash, amount: Decimal) {
        let mut entry = self
            .durable
            .entry((*address, *currency))
            .or_insert(Decimal::ZERO);
        *entry += amount;
    }

    /// Apply one leg to the speculative view unconditionally
    ///
    /// Used when reloading stored transactions at startup, where the checks
    /// already passed in a previous run.
    pub fn update_speculative(&self, address: &Address, currency: &Hash, amount: Decimal) {
        let mut entry = self
            .speculative
            .entry((*address, *currency))
            .or_insert(Decimal::ZERO);
        *entry += amount;
    }

    /// Load one snapshot entry into both views
    ///
    /// Fails if the durable entry already exists, which indicates the same
    /// snapshot line was applied twice.
    pub fn load_snapshot_entry(
        &self,
        address: &Address,
        currency: &Hash,
        amount: Decimal,
    ) -> Result<()> {
        let key = (*address, *currency);
        if self.durable.contains_key(&key) {
            tracing::error!(address = %address, currency = %currency, "Snapshot entry already exists");
            return Err(Error::SnapshotEntryExists {
                address: *address,
                currency: *currency,
            });
        }
        self.durable.insert(key, amount);
        self.speculative.insert(key, amount);
        Ok(())
    }

    /// Load a JSON balance snapshot into both views
    ///
    /// Returns the number of entries loaded.
    pub fn load_snapshot<R: std::io::Read>(&self, reader: R) -> Result<usize> {
        let entries: Vec<SnapshotEntry> = serde_json::from_reader(reader)
            .map_err(|e| Error::Snapshot(format!("Failed to parse snapshot: {}", e)))?;

        for entry in &entries {
            self.load_snapshot_entry(&entry.address, &entry.currency, entry.amount)?;
        }

        tracing::info!(entries = entries.len(), "Balance snapshot loaded");
        Ok(entries.len())
    }

    /// Verify that no entry in either view is negative
    ///
    /// Reports the first violation with its address, currency, and amount.
    /// Never repairs anything.
    pub fn validate(&self) -> Result<()> {
        for entry in self.durable.iter() {
            if *entry.value() < Decimal::ZERO {
                let (address, currency) = *entry.key();
                return Err(Error::NegativeBalance {
                    address,
                    currency,
                    amount: *entry.value(),
                });
            }
        }
        for entry in self.speculative.iter() {
            if *entry.value() < Decimal::ZERO {
                let (address, currency) = *entry.key();
                return Err(Error::NegativeBalance {
                    address,
                    currency,
                    amount: *entry.value(),
                });
            }
        }
        tracing::info!("Balance validation completed");
        Ok(())
    }

    /// Number of durable entries
    pub fn durable_len(&self) -> usize {
        self.durable.len()
    }

    /// Number of speculative entries
    pub fn speculative_len(&self) -> usize {
        self.speculative.len()
    }
}
