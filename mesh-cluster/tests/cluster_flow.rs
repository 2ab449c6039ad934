//! End-to-end tests for the meshnode core
//!
//! Exercises the full transaction lifecycle across all three layers:
//! - admission (balance reserve) and DAG attachment
//! - trust-chain scan feeding the confirmation pipeline
//! - index confirmations and dual-facet settlement
//! - cold-start recovery from a populated store

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mesh_cluster::{ClusterManager, CumulativeTrustEngine, NeighborhoodSelector};
use mesh_confirmation::{
    load_existing_transactions, replay_index_chain, spawn_confirmation_pipeline,
    ConfirmationHandle, NoopHooks, TransactionIndexService,
};
use mesh_ledger::config::PipelineConfig;
use mesh_ledger::{
    Address, BalanceLedger, Config, Hash, IndexConfirmation, Metrics, Storage, Transaction,
    TransactionKind, TransferLeg, TrustScore,
};
use rust_decimal::Decimal;

// Test configuration
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const TRUST: u8 = 80;
const THRESHOLD: f64 = 300.0;

#[tokio::test]
async fn test_lifecycle_attach_scan_confirm_settle() {
    let env = TestEnvironment::new(THRESHOLD).await;

    // Five chained transactions, each crediting its own address. With a
    // cumulative threshold of 300 and a sender trust of 80, only the two
    // oldest links (400 and 320) clear the bar.
    let hashes = env.attach_chain(5).await;

    assert_eq!(env.manager.working_len(), 5);
    assert_eq!(env.manager.source_count(), 1);

    env.manager.mark_started();
    let emitted = env.manager.scan_trust_chain().await;
    assert_eq!(emitted, 2);

    for hash in &hashes[..2] {
        let hash = *hash;
        wait_until("trust-chain confirmation", || {
            env.storage
                .get_transaction(&hash)
                .unwrap()
                .unwrap()
                .trust_chain_confirmed
        })
        .await;
    }

    // The two confirmed transactions receive their ledger slots and settle
    for (i, hash) in hashes[..2].iter().enumerate() {
        env.pipeline
            .submit_index(IndexConfirmation {
                transaction_hash: *hash,
                index: i as u64,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
    }

    for hash in &hashes[..2] {
        let hash = *hash;
        wait_until("settlement", || {
            env.storage
                .get_transaction(&hash)
                .unwrap()
                .unwrap()
                .settled_at
                .is_some()
        })
        .await;
    }

    assert_eq!(env.index.last_index(), Some(1));
    for n in 0..2u8 {
        assert_eq!(env.balances.balance(&addr(n), &currency()), credit_amount());
    }
    for n in 2..5u8 {
        assert_eq!(env.balances.balance(&addr(n), &currency()), Decimal::ZERO);
        assert_eq!(
            env.balances.speculative_balance(&addr(n), &currency()),
            credit_amount()
        );
    }

    assert_eq!(env.metrics.attached_total.get(), 5);
    assert_eq!(env.metrics.trust_chain_confirmed_total.get(), 2);
    assert_eq!(env.metrics.index_confirmed_total.get(), 2);
    assert_eq!(env.metrics.confirmed_total.get(), 2);

    // Confirmed transactions left the working set, the rest stays below the bar
    assert_eq!(env.manager.working_len(), 3);
    assert_eq!(env.manager.scan_trust_chain().await, 0);

    env.pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cold_start_rebuilds_state() {
    let env = TestEnvironment::new(THRESHOLD).await;
    let hashes = env.attach_chain(5).await;

    env.manager.mark_started();
    env.manager.scan_trust_chain().await;
    for (i, hash) in hashes[..2].iter().enumerate() {
        let hash = *hash;
        wait_until("trust-chain confirmation", || {
            env.storage
                .get_transaction(&hash)
                .unwrap()
                .unwrap()
                .trust_chain_confirmed
        })
        .await;
        env.pipeline
            .submit_index(IndexConfirmation {
                transaction_hash: hash,
                index: i as u64,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
    }
    for hash in &hashes[..2] {
        let hash = *hash;
        wait_until("settlement", || {
            env.storage
                .get_transaction(&hash)
                .unwrap()
                .unwrap()
                .settled_at
                .is_some()
        })
        .await;
    }
    env.pipeline.shutdown().await.unwrap();

    // Restart against the same store with fresh in-memory state
    let balances = Arc::new(BalanceLedger::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let index = Arc::new(TransactionIndexService::new(env.storage.clone()));

    let summaries = load_existing_transactions(&env.storage, &balances, &metrics).unwrap();
    assert_eq!(summaries.len(), 2);
    replay_index_chain(&env.storage, &index, &balances, &metrics, &summaries).unwrap();
    balances.validate().unwrap();

    assert_eq!(index.last_index(), Some(1));
    for n in 0..2u8 {
        assert_eq!(balances.balance(&addr(n), &currency()), credit_amount());
    }
    for n in 0..5u8 {
        assert_eq!(
            balances.speculative_balance(&addr(n), &currency()),
            credit_amount()
        );
    }
    assert_eq!(metrics.trust_chain_confirmed_total.get(), 2);
    assert_eq!(metrics.index_confirmed_total.get(), 2);
    assert_eq!(metrics.confirmed_total.get(), 2);

    // The cluster picks the unconfirmed tail back up, tip still selectable
    let pipeline = spawn_confirmation_pipeline(
        env.storage.clone(),
        balances.clone(),
        index.clone(),
        metrics.clone(),
        Arc::new(NoopHooks),
        &PipelineConfig::default(),
    );
    let manager = ClusterManager::new(
        env.storage.clone(),
        metrics.clone(),
        pipeline.clone(),
        Box::new(NeighborhoodSelector::default()),
        Box::new(CumulativeTrustEngine::new(THRESHOLD)),
    );
    assert_eq!(manager.load_unconfirmed().unwrap(), 3);
    assert_eq!(manager.source_count(), 1);
    let parents = manager
        .select_parents(TrustScore::new(TRUST).unwrap())
        .unwrap();
    assert_eq!(parents, vec![hashes[4]]);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reserve_gates_attachment() {
    let env = TestEnvironment::new(THRESHOLD).await;

    // A debit with no funds behind it never reaches the DAG
    let rejected = vec![
        TransferLeg::new(addr(9), currency(), Decimal::new(-500, 2)),
        TransferLeg::new(addr(1), currency(), Decimal::new(500, 2)),
    ];
    assert!(!env.balances.reserve(&rejected));
    assert_eq!(env.manager.working_len(), 0);

    // Funded sender passes admission and attaches
    env.balances
        .load_snapshot_entry(&addr(9), &currency(), Decimal::new(1000, 2))
        .unwrap();
    let funded = vec![
        TransferLeg::new(addr(9), currency(), Decimal::new(-400, 2)),
        TransferLeg::new(addr(1), currency(), Decimal::new(400, 2)),
    ];
    assert!(env.balances.reserve(&funded));
    env.manager
        .attach(Transaction::new(
            tx_hash(1),
            None,
            None,
            TrustScore::new(TRUST).unwrap(),
            TransactionKind::Transfer,
            funded,
        ))
        .unwrap();

    assert_eq!(env.manager.working_len(), 1);
    assert_eq!(
        env.balances.speculative_balance(&addr(9), &currency()),
        Decimal::new(600, 2)
    );
    assert_eq!(
        env.balances.balance(&addr(9), &currency()),
        Decimal::new(1000, 2)
    );

    env.pipeline.shutdown().await.unwrap();
}

// ============================================================================
// Test Helpers
// ============================================================================

struct TestEnvironment {
    _dir: tempfile::TempDir,
    storage: Arc<Storage>,
    balances: Arc<BalanceLedger>,
    metrics: Arc<Metrics>,
    index: Arc<TransactionIndexService>,
    pipeline: ConfirmationHandle,
    manager: Arc<ClusterManager>,
}

impl TestEnvironment {
    async fn new(threshold: f64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let balances = Arc::new(BalanceLedger::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let index = Arc::new(TransactionIndexService::new(storage.clone()));
        let pipeline = spawn_confirmation_pipeline(
            storage.clone(),
            balances.clone(),
            index.clone(),
            metrics.clone(),
            Arc::new(NoopHooks),
            &PipelineConfig::default(),
        );
        let manager = Arc::new(ClusterManager::new(
            storage.clone(),
            metrics.clone(),
            pipeline.clone(),
            Box::new(NeighborhoodSelector::default()),
            Box::new(CumulativeTrustEngine::new(threshold)),
        ));

        Self {
            _dir: dir,
            storage,
            balances,
            metrics,
            index,
            pipeline,
            manager,
        }
    }

    /// Attach a linear chain of `len` transactions, each crediting its own
    /// address, using parent selection for every link after the first.
    async fn attach_chain(&self, len: u8) -> Vec<Hash> {
        let mut hashes = Vec::new();
        for n in 0..len {
            let legs = vec![TransferLeg::new(addr(n), currency(), credit_amount())];
            assert!(self.balances.reserve(&legs));

            let (left, right) = if n == 0 {
                (None, None)
            } else {
                let parents = self
                    .manager
                    .select_parents(TrustScore::new(TRUST).unwrap())
                    .unwrap();
                assert_eq!(parents, vec![tx_hash(n - 1)]);
                (Some(parents[0]), None)
            };

            let tx = Transaction::new(
                tx_hash(n),
                left,
                right,
                TrustScore::new(TRUST).unwrap(),
                TransactionKind::Transfer,
                legs,
            );
            self.manager.attach(tx).unwrap();
            hashes.push(tx_hash(n));
        }
        hashes
    }
}

fn tx_hash(n: u8) -> Hash {
    Hash::from_bytes([n + 1; 32])
}

fn addr(n: u8) -> Address {
    Address::from_digest([0x40 + n; 32])
}

fn currency() -> Hash {
    Hash::from_bytes([0xaa; 32])
}

fn credit_amount() -> Decimal {
    Decimal::new(100, 2)
}

async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
