//! Single-consumer confirmation pipeline
//!
//! All consensus-state writes and all durable balance commits flow through
//! one actor task, the same single-writer pattern the storage layer's striped
//! locks back up. Producers (trust-chain scan, index consensus intake) hand
//! signals to the mailbox and never touch confirmation state themselves.
//!
//! A transaction settles when both confirmation facets are present, in
//! whichever order they arrive. Index signals that run ahead of the chain are
//! parked and replayed the moment the gap closes, without requiring a new
//! signal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mesh_ledger::types::{
    Address, Hash, IndexConfirmation, Transaction, TransactionKind, TrustConfirmation,
};
use mesh_ledger::{BalanceLedger, Metrics, Storage};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::index::{InsertOutcome, TransactionIndexService};

/// Confirmation signal consumed by the pipeline
#[derive(Debug, Clone)]
pub enum ConfirmationSignal {
    /// Trust-chain consensus reached
    Trust(TrustConfirmation),

    /// Index consensus reached
    Index(IndexConfirmation),
}

/// Message sent to the pipeline actor
enum PipelineMessage {
    /// Process a confirmation signal
    Signal(ConfirmationSignal),

    /// Drain the mailbox, ack and stop
    Shutdown { ack: oneshot::Sender<()> },
}

/// Downstream notifications fired by the pipeline
///
/// Every method has a no-op default, so implementors override only the
/// notifications they care about. Called from the pipeline task; keep
/// implementations short.
pub trait ConfirmationHooks: Send + Sync {
    /// A durable balance entry changed
    fn on_balance_changed(&self, _address: &Address, _currency: &Hash) {}

    /// A currency-creation transaction settled
    fn on_currency_confirmed(&self, _transaction: &Transaction) {}

    /// A minting transaction settled
    fn on_minting_confirmed(&self, _transaction: &Transaction) {}

    /// Address history must be refreshed for the settled transaction
    fn on_address_history_changed(&self, _transaction: &Transaction) {}

    /// A transaction settled
    fn on_transaction_confirmed(&self, _transaction: &Transaction) {}
}

/// Hooks implementation that ignores every notification
pub struct NoopHooks;

impl ConfirmationHooks for NoopHooks {}

/// Actor that applies confirmation signals
pub struct ConfirmationPipeline {
    /// Durable store holding transaction records
    storage: Arc<Storage>,

    /// Balance ledger receiving durable commits at settlement
    balances: Arc<BalanceLedger>,

    /// Index chain the index signals feed
    index: Arc<TransactionIndexService>,

    /// Pipeline instruments
    metrics: Arc<Metrics>,

    /// Downstream notifications
    hooks: Arc<dyn ConfirmationHooks>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<PipelineMessage>,

    /// Index signals that arrived ahead of the chain, keyed by index
    waiting: HashMap<u64, IndexConfirmation>,

    /// Waiting-map size that triggers a warning
    waiting_warn_threshold: usize,
}

impl ConfirmationPipeline {
    /// Run the actor event loop
    pub async fn run(mut self) {
        tracing::info!("Confirmation pipeline started");

        while let Some(msg) = self.mailbox.recv().await {
            self.metrics.set_queue_depth(self.mailbox.len() as i64);

            match msg {
                PipelineMessage::Signal(signal) => {
                    if let Err(e) = self.handle_signal(signal) {
                        tracing::error!("Error handling confirmation signal: {}", e);
                    }
                }
                PipelineMessage::Shutdown { ack } => {
                    self.drain();
                    let _ = ack.send(());
                    break;
                }
            }
        }

        tracing::info!("Confirmation pipeline stopped");
    }

    /// Process everything still queued, then let the caller observe the ack
    fn drain(&mut self) {
        let mut drained = 0usize;
        while let Ok(msg) = self.mailbox.try_recv() {
            if let PipelineMessage::Signal(signal) = msg {
                drained += 1;
                if let Err(e) = self.handle_signal(signal) {
                    tracing::error!("Error handling signal during shutdown: {}", e);
                }
            }
        }
        if drained > 0 {
            tracing::info!("Processed {} queued signals during shutdown", drained);
        }
        self.metrics.set_queue_depth(0);
    }

    fn handle_signal(&mut self, signal: ConfirmationSignal) -> Result<()> {
        match signal {
            ConfirmationSignal::Trust(trust) => self.handle_trust(trust),
            ConfirmationSignal::Index(index) => self.handle_index(index),
        }
    }

    /// Record trust-chain consensus on the transaction record
    fn handle_trust(&mut self, signal: TrustConfirmation) -> Result<()> {
        let hash = signal.transaction_hash;
        let mut first_trust = false;
        let updated = self.storage.update_transaction(&hash, |tx| {
            if !tx.trust_chain_confirmed {
                tx.trust_chain_confirmed = true;
                tx.trust_chain_trust_score = signal.trust_score;
                tx.trust_chain_time = Some(signal.timestamp);
                first_trust = true;
            }
        })?;

        if first_trust {
            self.metrics.record_trust_chain_confirmation();
            if updated.is_fully_confirmed() {
                self.settle(&updated)?;
            }
        }

        Ok(())
    }

    /// Feed an index signal to the chain; park it if it runs ahead
    fn handle_index(&mut self, signal: IndexConfirmation) -> Result<()> {
        match self.index.insert(&signal.transaction_hash, signal.index)? {
            InsertOutcome::Inserted => {
                // The chain has advanced past this entry either way, so the
                // parked successors replay even when the record update fails.
                let applied = self.apply_index_confirmation(signal);
                self.cascade_waiting();
                applied
            }
            InsertOutcome::Deferred => {
                tracing::debug!(
                    index = signal.index,
                    expected = self.index.expected_index(),
                    "Index signal ahead of the chain, parked"
                );
                self.waiting.insert(signal.index, signal);
                self.metrics.set_waiting_index_signals(self.waiting.len() as i64);
                if self.waiting.len() >= self.waiting_warn_threshold {
                    tracing::warn!(
                        waiting = self.waiting.len(),
                        expected = self.index.expected_index(),
                        "Out-of-order index signal backlog is growing"
                    );
                }
                Ok(())
            }
        }
    }

    /// Replay parked signals for as long as they fill the next gap
    ///
    /// A record update that fails is logged and skipped; the replay moves on
    /// to the next parked signal.
    fn cascade_waiting(&mut self) {
        while let Some(parked) = self.waiting.remove(&self.index.expected_index()) {
            match self.index.insert(&parked.transaction_hash, parked.index) {
                Ok(InsertOutcome::Inserted) => {
                    if let Err(e) = self.apply_index_confirmation(parked) {
                        tracing::error!("Error applying parked index signal: {}", e);
                    }
                }
                Ok(InsertOutcome::Deferred) => {
                    // Chain moved away from this entry, park it again
                    self.waiting.insert(parked.index, parked);
                    break;
                }
                Err(e) => {
                    // Chain did not advance, keep the signal for a later pass
                    tracing::error!("Error replaying parked index signal: {}", e);
                    self.waiting.insert(parked.index, parked);
                    break;
                }
            }
        }
        self.metrics.set_waiting_index_signals(self.waiting.len() as i64);
    }

    /// Record index consensus on the transaction record
    fn apply_index_confirmation(&mut self, signal: IndexConfirmation) -> Result<()> {
        let hash = signal.transaction_hash;
        let mut first_index = false;
        let updated = self.storage.update_transaction(&hash, |tx| {
            if tx.index_confirmation.is_none() {
                tx.index_confirmation = Some(signal);
                first_index = true;
            }
        })?;

        if first_index {
            self.metrics.record_index_confirmation();
            if updated.is_fully_confirmed() {
                self.settle(&updated)?;
            }
        }

        Ok(())
    }

    /// Both facets present: stamp settlement, commit balances, notify
    fn settle(&self, transaction: &Transaction) -> Result<()> {
        let index_time = match &transaction.index_confirmation {
            Some(confirmation) => confirmation.timestamp,
            None => return Ok(()),
        };
        let trust_time = match transaction.trust_chain_time {
            Some(time) => time,
            None => return Ok(()),
        };
        let settled_at = trust_time.max(index_time);

        let settled = self.storage.update_transaction(&transaction.hash, |tx| {
            tx.settled_at = Some(settled_at);
        })?;

        for leg in &settled.legs {
            self.balances.commit(&leg.address, &leg.currency, leg.amount);
            self.hooks.on_balance_changed(&leg.address, &leg.currency);
        }
        self.metrics.record_full_confirmation();

        match settled.kind {
            TransactionKind::CurrencyCreation => self.hooks.on_currency_confirmed(&settled),
            TransactionKind::Minting => self.hooks.on_minting_confirmed(&settled),
            TransactionKind::Transfer => {}
        }
        self.hooks.on_address_history_changed(&settled);
        self.hooks.on_transaction_confirmed(&settled);

        tracing::debug!(hash = %settled.hash, "Transaction settled");
        Ok(())
    }
}

/// Handle for submitting confirmation signals
#[derive(Clone)]
pub struct ConfirmationHandle {
    sender: mpsc::Sender<PipelineMessage>,

    /// Cleared when shutdown begins; later submissions are rejected
    accepting: Arc<AtomicBool>,
}

impl ConfirmationHandle {
    /// Submit a trust-chain confirmation
    pub async fn submit_trust(&self, confirmation: TrustConfirmation) -> Result<()> {
        self.submit(ConfirmationSignal::Trust(confirmation)).await
    }

    /// Submit an index confirmation
    pub async fn submit_index(&self, confirmation: IndexConfirmation) -> Result<()> {
        self.submit(ConfirmationSignal::Index(confirmation)).await
    }

    /// Submit any confirmation signal
    pub async fn submit(&self, signal: ConfirmationSignal) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.sender
            .send(PipelineMessage::Signal(signal))
            .await
            .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))
    }

    /// Stop accepting signals, drain the mailbox, wait for the worker's ack
    pub async fn shutdown(&self) -> Result<()> {
        self.accepting.store(false, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PipelineMessage::Shutdown { ack: tx })
            .await
            .map_err(|_| Error::Concurrency("Pipeline mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the confirmation pipeline actor
pub fn spawn_confirmation_pipeline(
    storage: Arc<Storage>,
    balances: Arc<BalanceLedger>,
    index: Arc<TransactionIndexService>,
    metrics: Arc<Metrics>,
    hooks: Arc<dyn ConfirmationHooks>,
    config: &mesh_ledger::config::PipelineConfig,
) -> ConfirmationHandle {
    let (tx, rx) = mpsc::channel(config.queue_capacity);

    let pipeline = ConfirmationPipeline {
        storage,
        balances,
        index,
        metrics,
        hooks,
        mailbox: rx,
        waiting: HashMap::new(),
        waiting_warn_threshold: config.waiting_warn_threshold,
    };

    tokio::spawn(async move {
        pipeline.run().await;
    });

    ConfirmationHandle {
        sender: tx,
        accepting: Arc::new(AtomicBool::new(true)),
    }
}
