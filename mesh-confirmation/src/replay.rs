//! Cold-start recovery
//!
//! After a restart the in-memory confirmation state is rebuilt from storage
//! in two passes. The first walks every stored transaction, reapplies its
//! legs to the speculative balance view and collects the indexed
//! transactions. The second walks the index chain from position zero,
//! recomputing the accumulated hash and reapplying durable balances for the
//! transactions that had fully settled.
//!
//! Verification stops at the first inconsistency. Whatever prefix was
//! verified stays applied, and the last verified entry is installed as the
//! index service high-water mark even when replay aborts, so the node resumes
//! from the good prefix instead of index zero.

use std::collections::BTreeMap;

use mesh_ledger::crypto::{accumulated_hash, genesis_accumulated_hash};
use mesh_ledger::types::{IndexEntry, TransactionSummary};
use mesh_ledger::{BalanceLedger, Metrics, Storage};

use crate::error::{Error, Result};
use crate::index::TransactionIndexService;

/// Rebuild the speculative balance view from stored transactions
///
/// Returns the indexed transactions keyed by their chain position, the input
/// for [`replay_index_chain`]. Trust-chain confirmations seen along the way
/// are counted so the metrics survive restarts.
pub fn load_existing_transactions(
    storage: &Storage,
    balances: &BalanceLedger,
    metrics: &Metrics,
) -> Result<BTreeMap<u64, TransactionSummary>> {
    let mut indexed = BTreeMap::new();
    let mut loaded = 0u64;

    for transaction in storage.transactions()? {
        let transaction = transaction?;
        loaded += 1;

        for leg in &transaction.legs {
            balances.update_speculative(&leg.address, &leg.currency, leg.amount);
        }
        if transaction.trust_chain_confirmed {
            metrics.record_trust_chain_confirmation();
        }
        if let Some(confirmation) = &transaction.index_confirmation {
            indexed.insert(confirmation.index, transaction.summary());
        }
    }

    tracing::info!(
        loaded,
        indexed = indexed.len(),
        "Loaded existing transactions"
    );
    Ok(indexed)
}

/// Verify the index chain and reapply durable balances for settled entries
///
/// Walks indexes `0..summaries.len()` in order. A missing entry, a missing
/// transaction or an accumulated-hash mismatch aborts the walk with an error
/// naming the failing index; effects applied for the verified prefix stay
/// applied. On every exit path the last verified entry becomes the index
/// service high-water mark.
pub fn replay_index_chain(
    storage: &Storage,
    index: &TransactionIndexService,
    balances: &BalanceLedger,
    metrics: &Metrics,
    summaries: &BTreeMap<u64, TransactionSummary>,
) -> Result<()> {
    tracing::info!("Replaying the transaction index chain");

    let mut previous_hash = genesis_accumulated_hash();
    let mut last_verified: Option<IndexEntry> = None;

    let outcome = (|| -> Result<()> {
        let total = summaries.len() as u64;
        let mut expected = 0u64;

        for item in storage.index_entries_from(0)? {
            if expected == total {
                break;
            }
            let entry = item?;
            if entry.index != expected {
                return Err(Error::MissingIndexEntry { index: expected });
            }
            let summary =
                summaries
                    .get(&expected)
                    .ok_or_else(|| Error::MissingIndexedTransaction {
                        index: expected,
                        hash: entry.transaction_hash,
                    })?;

            let recomputed = accumulated_hash(&previous_hash, &summary.hash, expected);
            if recomputed != entry.accumulated_hash {
                return Err(Error::AccumulatedHashMismatch { index: expected });
            }

            previous_hash = recomputed;
            last_verified = Some(entry);
            metrics.record_index_confirmation();

            if summary.trust_chain_confirmed {
                for leg in &summary.legs {
                    balances.commit(&leg.address, &leg.currency, leg.amount);
                }
                metrics.record_full_confirmation();
            }
            expected += 1;
        }

        // A chain that ends early has a hole at the first unseen index
        if expected < total {
            return Err(Error::MissingIndexEntry { index: expected });
        }
        Ok(())
    })();

    match &last_verified {
        Some(entry) => tracing::info!(index = entry.index, "Index chain replay finished"),
        None => tracing::info!("Index chain replay finished with an empty chain"),
    }
    index.install_last_entry(last_verified);

    outcome
}
