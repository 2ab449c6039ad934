//! Meshnode binary
//!
//! Wires the ledger, confirmation and cluster layers into a runnable node:
//! cold-start recovery, the confirmation pipeline and the periodic
//! trust-chain scan.

use std::sync::Arc;

use anyhow::Context;
use mesh_cluster::{
    spawn_trust_chain_scan, ClusterManager, CumulativeTrustEngine, NeighborhoodSelector,
};
use mesh_confirmation::{
    load_existing_transactions, replay_index_chain, spawn_confirmation_pipeline, NoopHooks,
    TransactionIndexService,
};
use mesh_ledger::{BalanceLedger, Config, Metrics, Storage};
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting Meshnode");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("MESHNODE_CONFIG") {
        info!("Loading config from: {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        Config::from_env()?
    };

    info!(node = %config.node_name, "Opening storage at {:?}", config.data_dir);
    let storage = Arc::new(Storage::open(&config)?);
    let balances = Arc::new(BalanceLedger::new());
    let metrics = Arc::new(Metrics::new().context("metrics registry")?);

    // A balance snapshot seeds only a store with no history yet
    if let Some(snapshot_file) = &config.snapshot_file {
        if storage.transaction_count()? == 0 {
            let file = std::fs::File::open(snapshot_file)
                .with_context(|| format!("opening snapshot {:?}", snapshot_file))?;
            let loaded = balances.load_snapshot(file)?;
            info!(loaded, "Loaded balance snapshot");
        }
    }

    // Cold start: rebuild balances, verify the index chain
    let index = Arc::new(TransactionIndexService::new(storage.clone()));
    let summaries = load_existing_transactions(&storage, &balances, &metrics)?;
    if let Err(e) = replay_index_chain(&storage, &index, &balances, &metrics, &summaries) {
        error!("Index chain replay aborted: {}", e);
    }
    balances.validate()?;

    let pipeline = spawn_confirmation_pipeline(
        storage.clone(),
        balances.clone(),
        index.clone(),
        metrics.clone(),
        Arc::new(NoopHooks),
        &config.pipeline,
    );

    let manager = Arc::new(ClusterManager::new(
        storage.clone(),
        metrics.clone(),
        pipeline.clone(),
        Box::new(NeighborhoodSelector::default()),
        Box::new(CumulativeTrustEngine::new(
            config.cluster.trust_chain_threshold,
        )),
    ));
    manager.load_unconfirmed()?;
    manager.mark_started();

    let scan = spawn_trust_chain_scan(
        manager.clone(),
        Duration::from_millis(config.cluster.scan_period_ms),
        Duration::from_millis(config.cluster.scan_initial_delay_ms),
    );

    info!("Meshnode running");
    info!("- data dir: {:?}", config.data_dir);
    info!("- transactions: {}", storage.transaction_count()?);
    info!("- sources: {}", manager.source_count());

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }

    // Graceful shutdown: stop producing, then drain the pipeline
    info!("Shutting down Meshnode...");
    scan.stop().await;
    pipeline.shutdown().await?;

    info!("Meshnode stopped");
    Ok(())
}
