//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the node core.
//!
//! # Metrics
//!
//! - `mesh_confirmed_total` - Transactions fully confirmed and settled
//! - `mesh_trust_chain_confirmed_total` - Trust-chain confirmations processed
//! - `mesh_index_confirmed_total` - Index confirmations inserted into the chain
//! - `mesh_transactions_attached_total` - Transactions attached to the DAG
//! - `mesh_confirmation_queue_depth` - Signals queued for the pipeline worker
//! - `mesh_waiting_index_signals` - Out-of-order index signals parked for a gap
//! - `mesh_dag_sources` - Current number of sources in the DAG
//!
//! Every instrument is registered on an instance-owned registry, so several
//! nodes can live in one process without colliding.

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions fully confirmed and settled
    pub confirmed_total: IntCounter,

    /// Trust-chain confirmations processed
    pub trust_chain_confirmed_total: IntCounter,

    /// Index confirmations inserted into the chain
    pub index_confirmed_total: IntCounter,

    /// Transactions attached to the DAG
    pub attached_total: IntCounter,

    /// Signals queued for the pipeline worker
    pub queue_depth: IntGauge,

    /// Out-of-order index signals parked for a gap
    pub waiting_index_signals: IntGauge,

    /// Current number of sources in the DAG
    pub dag_sources: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let confirmed_total = IntCounter::with_opts(Opts::new(
            "mesh_confirmed_total",
            "Transactions fully confirmed and settled",
        ))?;
        registry.register(Box::new(confirmed_total.clone()))?;

        let trust_chain_confirmed_total = IntCounter::with_opts(Opts::new(
            "mesh_trust_chain_confirmed_total",
            "Trust-chain confirmations processed",
        ))?;
        registry.register(Box::new(trust_chain_confirmed_total.clone()))?;

        let index_confirmed_total = IntCounter::with_opts(Opts::new(
            "mesh_index_confirmed_total",
            "Index confirmations inserted into the chain",
        ))?;
        registry.register(Box::new(index_confirmed_total.clone()))?;

        let attached_total = IntCounter::with_opts(Opts::new(
            "mesh_transactions_attached_total",
            "Transactions attached to the DAG",
        ))?;
        registry.register(Box::new(attached_total.clone()))?;

        let queue_depth = IntGauge::with_opts(Opts::new(
            "mesh_confirmation_queue_depth",
            "Signals queued for the pipeline worker",
        ))?;
        registry.register(Box::new(queue_depth.clone()))?;

        let waiting_index_signals = IntGauge::with_opts(Opts::new(
            "mesh_waiting_index_signals",
            "Out-of-order index signals parked for a gap",
        ))?;
        registry.register(Box::new(waiting_index_signals.clone()))?;

        let dag_sources = IntGauge::with_opts(Opts::new(
            "mesh_dag_sources",
            "Current number of sources in the DAG",
        ))?;
        registry.register(Box::new(dag_sources.clone()))?;

        Ok(Self {
            confirmed_total,
            trust_chain_confirmed_total,
            index_confirmed_total,
            attached_total,
            queue_depth,
            waiting_index_signals,
            dag_sources,
            registry,
        })
    }

    /// Record a fully confirmed transaction
    pub fn record_full_confirmation(&self) {
        self.confirmed_total.inc();
    }

    /// Record a processed trust-chain confirmation
    pub fn record_trust_chain_confirmation(&self) {
        self.trust_chain_confirmed_total.inc();
    }

    /// Record an index confirmation inserted into the chain
    pub fn record_index_confirmation(&self) {
        self.index_confirmed_total.inc();
    }

    /// Record a transaction attached to the DAG
    pub fn record_attachment(&self) {
        self.attached_total.inc();
    }

    /// Update the pipeline queue depth
    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.set(depth);
    }

    /// Update the parked index-signal count
    pub fn set_waiting_index_signals(&self, count: i64) {
        self.waiting_index_signals.set(count);
    }

    /// Update the source count
    pub fn set_source_count(&self, count: i64) {
        self.dag_sources.set(count);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.confirmed_total.get(), 0);
        assert_eq!(metrics.trust_chain_confirmed_total.get(), 0);
        assert_eq!(metrics.index_confirmed_total.get(), 0);
    }

    #[test]
    fn test_independent_instances() {
        // Instance registries must not collide inside one process
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_full_confirmation();
        assert_eq!(first.confirmed_total.get(), 1);
        assert_eq!(second.confirmed_total.get(), 0);
    }

    #[test]
    fn test_record_confirmations() {
        let metrics = Metrics::new().unwrap();
        metrics.record_trust_chain_confirmation();
        metrics.record_index_confirmation();
        metrics.record_index_confirmation();
        assert_eq!(metrics.trust_chain_confirmed_total.get(), 1);
        assert_eq!(metrics.index_confirmed_total.get(), 2);
    }

    #[test]
    fn test_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.set_queue_depth(17);
        metrics.set_waiting_index_signals(3);
        metrics.set_source_count(42);
        assert_eq!(metrics.queue_depth.get(), 17);
        assert_eq!(metrics.waiting_index_signals.get(), 3);
        assert_eq!(metrics.dag_sources.get(), 42);
    }

    #[test]
    fn test_registry_gathers_families() {
        let metrics = Metrics::new().unwrap();
        metrics.record_attachment();

        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "mesh_transactions_attached_total"));
    }
}
