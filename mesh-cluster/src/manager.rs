//! DAG cluster manager
//!
//! Owns the unconfirmed neighborhood of the DAG: the working set of
//! transactions still waiting for trust-chain consensus, and the current
//! sources bucketed by sender trust score for parent selection.
//!
//! Attachment and bucket membership mutate under one lock, so a source is
//! never selected while it is halfway through becoming a parent. The source
//! counter moves incrementally with every transition; nothing recounts it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mesh_confirmation::ConfirmationHandle;
use mesh_ledger::types::{Hash, Transaction, TrustScore, TRUST_SCORE_BUCKETS};
use mesh_ledger::{Metrics, Storage};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::policy::{SourceCandidate, SourceSelector, TrustChainEngine};

/// Maximum number of parents a transaction can approve
pub const MAX_PARENTS: usize = 2;

/// Manager for the unconfirmed part of the DAG
pub struct ClusterManager {
    /// Durable store shared with the rest of the node
    storage: Arc<Storage>,

    /// Cluster instruments
    metrics: Arc<Metrics>,

    /// Pipeline receiving trust-chain confirmations from the scan
    pipeline: ConfirmationHandle,

    /// Parent selection policy
    selector: Box<dyn SourceSelector>,

    /// Trust-chain detection policy
    engine: Box<dyn TrustChainEngine>,

    /// Transactions awaiting trust-chain consensus
    working: DashMap<Hash, Transaction>,

    /// Source candidates bucketed by sender trust score
    ///
    /// Guarded together with child-set mutation: a source leaves its bucket
    /// in the same critical section that gives it its first child.
    buckets: Mutex<Vec<Vec<SourceCandidate>>>,

    /// Incremental source count, mirrored into the metrics gauge
    total_sources: AtomicI64,

    /// One-time readiness gate for the periodic scan
    started: AtomicBool,

    /// Overlap guard: a scan invocation that finds it held is skipped
    scan_guard: tokio::sync::Mutex<()>,
}

impl ClusterManager {
    /// Create a manager with the given policies
    pub fn new(
        storage: Arc<Storage>,
        metrics: Arc<Metrics>,
        pipeline: ConfirmationHandle,
        selector: Box<dyn SourceSelector>,
        engine: Box<dyn TrustChainEngine>,
    ) -> Self {
        Self {
            storage,
            metrics,
            pipeline,
            selector,
            engine,
            working: DashMap::new(),
            buckets: Mutex::new(vec![Vec::new(); TRUST_SCORE_BUCKETS]),
            total_sources: AtomicI64::new(0),
            started: AtomicBool::new(false),
            scan_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Attach a new transaction to the DAG
    ///
    /// Every declared parent must already be known, either still unconfirmed
    /// or settled in storage; otherwise nothing is mutated. On success the
    /// transaction enters the working set, storage and its source bucket,
    /// and each parent gains a child and stops being a source.
    pub fn attach(&self, mut transaction: Transaction) -> Result<()> {
        for parent in transaction.parents() {
            if !self.working.contains_key(&parent) && !self.storage.contains_transaction(&parent)? {
                return Err(Error::UnknownParent(parent));
            }
        }

        let mut buckets = self.buckets.lock();

        let attachment_time = Utc::now();
        transaction.attachment_time = Some(attachment_time);

        let child_hash = transaction.hash;
        // One atomic write covers the new record and every parent update;
        // in-memory state only moves once it has succeeded
        let parents = self
            .storage
            .put_transaction_with_parents(&transaction, |parent| parent.add_child(child_hash))?;

        for parent in &parents {
            if let Some(mut working_parent) = self.working.get_mut(&parent.hash) {
                working_parent.add_child(child_hash);
            }
            if remove_candidate(&mut buckets, parent.sender_trust_score.bucket(), &parent.hash) {
                self.total_sources.fetch_sub(1, Ordering::SeqCst);
            }
        }

        buckets[transaction.sender_trust_score.bucket()].push(SourceCandidate {
            hash: child_hash,
            attachment_time,
        });
        self.working.insert(child_hash, transaction);

        let sources = self.total_sources.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_source_count(sources);
        self.metrics.record_attachment();
        tracing::debug!(hash = %child_hash, sources, "Transaction attached");
        Ok(())
    }

    /// Select up to two parents for a transaction with the given trust score
    ///
    /// An empty result means no sources fit and the caller attaches
    /// parentless. There is no retry here; admission decides what to do.
    pub fn select_parents(&self, trust_score: TrustScore) -> Result<Vec<Hash>> {
        let buckets = self.buckets.lock();
        let selected = self.selector.select_sources(&buckets, trust_score);
        if selected.len() > MAX_PARENTS {
            return Err(Error::TooManyParents(selected.len()));
        }
        Ok(selected)
    }

    /// Add an already-stored transaction to the working set (cold start)
    ///
    /// Only sources get bucket membership; a loaded transaction that already
    /// has children can never be selected as a parent again.
    pub fn add_unconfirmed_transaction(&self, transaction: Transaction) {
        let mut buckets = self.buckets.lock();
        if transaction.is_source() {
            let attachment_time = transaction.attachment_time.unwrap_or(transaction.created_at);
            buckets[transaction.sender_trust_score.bucket()].push(SourceCandidate {
                hash: transaction.hash,
                attachment_time,
            });
            let sources = self.total_sources.fetch_add(1, Ordering::SeqCst) + 1;
            self.metrics.set_source_count(sources);
        }
        self.working.insert(transaction.hash, transaction);
    }

    /// Load every transaction without trust-chain consensus from storage
    pub fn load_unconfirmed(&self) -> Result<usize> {
        let mut loaded = 0usize;
        for transaction in self.storage.transactions()? {
            let transaction = transaction?;
            if !transaction.trust_chain_confirmed {
                self.add_unconfirmed_transaction(transaction);
                loaded += 1;
            }
        }
        tracing::info!(
            loaded,
            sources = self.source_count(),
            "Loaded unconfirmed transactions into the cluster"
        );
        Ok(loaded)
    }

    /// Open the gate for the periodic trust-chain scan
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        tracing::info!("Cluster manager started");
    }

    /// Whether the readiness gate is open
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Current number of sources
    pub fn source_count(&self) -> i64 {
        self.total_sources.load(Ordering::SeqCst)
    }

    /// Number of transactions awaiting trust-chain consensus
    pub fn working_len(&self) -> usize {
        self.working.len()
    }

    /// Whether the working set holds the given transaction
    pub fn contains(&self, hash: &Hash) -> bool {
        self.working.contains_key(hash)
    }

    /// Run one trust-chain detection pass
    ///
    /// Skipped before [`mark_started`](Self::mark_started) and when another
    /// invocation is still running. A confirmed transaction leaves the
    /// working set only after the pipeline accepts its confirmation; a failed
    /// handoff keeps it in place for a later pass. Returns how many were
    /// emitted.
    pub async fn scan_trust_chain(&self) -> usize {
        if !self.started.load(Ordering::SeqCst) {
            return 0;
        }
        let _guard = match self.scan_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!("Trust chain scan still running, tick skipped");
                return 0;
            }
        };

        let snapshot: HashMap<Hash, Transaction> = self
            .working
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let confirmations = self.engine.confirmed(&snapshot);
        let mut emitted = 0usize;
        for confirmation in confirmations {
            let hash = confirmation.transaction_hash;
            if !self.working.contains_key(&hash) {
                continue;
            }
            if let Err(e) = self.pipeline.submit_trust(confirmation).await {
                tracing::warn!(hash = %hash, "Trust confirmation not handed off, keeping transaction: {}", e);
                continue;
            }
            emitted += 1;
            let removed = match self.working.remove(&hash) {
                Some((_, transaction)) => transaction,
                None => continue,
            };
            {
                let mut buckets = self.buckets.lock();
                if remove_candidate(&mut buckets, removed.sender_trust_score.bucket(), &hash) {
                    let sources = self.total_sources.fetch_sub(1, Ordering::SeqCst) - 1;
                    self.metrics.set_source_count(sources);
                }
            }
        }

        if emitted > 0 {
            tracing::info!(
                emitted,
                remaining = self.working.len(),
                "Trust chain scan emitted confirmations"
            );
        }
        emitted
    }
}

/// Remove `hash` from its bucket; true if it was present
fn remove_candidate(buckets: &mut [Vec<SourceCandidate>], bucket: usize, hash: &Hash) -> bool {
    let list = &mut buckets[bucket];
    match list.iter().position(|candidate| candidate.hash == *hash) {
        Some(position) => {
            list.remove(position);
            true
        }
        None => false,
    }
}
