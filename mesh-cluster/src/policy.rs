//! Pluggable attachment and confirmation policies
//!
//! Which sources a new transaction approves, and when accumulated descendant
//! trust is enough to confirm, are behavioral choices rather than structural
//! ones. Both sit behind traits so deployments can swap the rules without
//! touching the DAG manager. The defaults implement a trust-score
//! neighborhood window and the cumulative-trust rule.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mesh_ledger::types::{Hash, Transaction, TrustConfirmation, TrustScore};
use rand::Rng;

/// A source available for attachment
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCandidate {
    /// Transaction hash
    pub hash: Hash,

    /// When the source was attached to the DAG
    pub attachment_time: DateTime<Utc>,
}

/// Chooses which sources a new transaction approves
pub trait SourceSelector: Send + Sync {
    /// Select up to two distinct parents from the trust-score buckets
    ///
    /// `buckets[i]` holds the current sources whose sender trust score is
    /// `i`. An empty result means the transaction attaches parentless.
    fn select_sources(&self, buckets: &[Vec<SourceCandidate>], trust_score: TrustScore)
        -> Vec<Hash>;
}

/// Neighborhood selector: prefers sources with a similar trust score
///
/// Starts at the bucket matching the sender's trust score and widens the
/// window one bucket at a time until it covers a minimum share of all
/// sources or hits the radius limit, then picks up to two distinct
/// candidates uniformly at random from the window.
pub struct NeighborhoodSelector {
    /// Share of all sources the window should cover before selection
    min_source_fraction: f64,

    /// Widest window, in buckets on each side of the target
    max_radius: usize,
}

impl NeighborhoodSelector {
    /// Create a selector with explicit window limits
    pub fn new(min_source_fraction: f64, max_radius: usize) -> Self {
        Self {
            min_source_fraction,
            max_radius,
        }
    }
}

impl Default for NeighborhoodSelector {
    fn default() -> Self {
        Self {
            min_source_fraction: 0.1,
            max_radius: 10,
        }
    }
}

impl SourceSelector for NeighborhoodSelector {
    fn select_sources(
        &self,
        buckets: &[Vec<SourceCandidate>],
        trust_score: TrustScore,
    ) -> Vec<Hash> {
        let total: usize = buckets.iter().map(Vec::len).sum();
        if total == 0 {
            return Vec::new();
        }
        let wanted = ((total as f64 * self.min_source_fraction).ceil() as usize).max(1);
        let target = trust_score.bucket();

        let mut radius = 0;
        let window = loop {
            let low = target.saturating_sub(radius);
            let high = (target + radius).min(buckets.len() - 1);
            let collected: Vec<&SourceCandidate> =
                buckets[low..=high].iter().flatten().collect();
            let spans_all = low == 0 && high == buckets.len() - 1;
            if collected.len() >= wanted || spans_all || radius >= self.max_radius {
                break collected;
            }
            radius += 1;
        };

        let mut rng = rand::thread_rng();
        match window.len() {
            0 => Vec::new(),
            1 => vec![window[0].hash],
            2 => vec![window[0].hash, window[1].hash],
            n => {
                let first = rng.gen_range(0..n);
                // Second draw over n-1 slots, shifted past the first pick
                let mut second = rng.gen_range(0..n - 1);
                if second >= first {
                    second += 1;
                }
                vec![window[first].hash, window[second].hash]
            }
        }
    }
}

/// Decides which unconfirmed transactions have reached trust-chain consensus
pub trait TrustChainEngine: Send + Sync {
    /// Confirmations to emit for the given working set
    fn confirmed(&self, working: &HashMap<Hash, Transaction>) -> Vec<TrustConfirmation>;
}

/// Cumulative-trust rule
///
/// A transaction's trust-chain score is its own sender trust plus the best
/// cumulative score among its children in the working set, so trust
/// accumulates down approval chains. Transactions at or above the threshold
/// are confirmed with the score they achieved.
pub struct CumulativeTrustEngine {
    threshold: f64,
}

impl CumulativeTrustEngine {
    /// Default confirmation threshold
    pub const DEFAULT_THRESHOLD: f64 = 300.0;

    /// Create an engine with an explicit threshold
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for CumulativeTrustEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl TrustChainEngine for CumulativeTrustEngine {
    fn confirmed(&self, working: &HashMap<Hash, Transaction>) -> Vec<TrustConfirmation> {
        let mut scores: HashMap<Hash, f64> = HashMap::with_capacity(working.len());
        let now = Utc::now();
        let mut confirmations = Vec::new();

        for (hash, transaction) in working {
            if transaction.trust_chain_confirmed {
                continue;
            }
            let score = cumulative_trust(working, &mut scores, *hash);
            if score >= self.threshold {
                confirmations.push(TrustConfirmation {
                    transaction_hash: *hash,
                    trust_score: score,
                    timestamp: now,
                });
            }
        }
        confirmations
    }
}

/// Iterative post-order walk over children edges; `scores` memoizes
/// finished subtrees across roots
fn cumulative_trust(
    working: &HashMap<Hash, Transaction>,
    scores: &mut HashMap<Hash, f64>,
    root: Hash,
) -> f64 {
    let mut stack = vec![root];
    while let Some(&hash) = stack.last() {
        if scores.contains_key(&hash) {
            stack.pop();
            continue;
        }
        let transaction = match working.get(&hash) {
            Some(transaction) => transaction,
            None => {
                scores.insert(hash, 0.0);
                stack.pop();
                continue;
            }
        };

        let mut best_child = 0.0f64;
        let mut ready = true;
        for child in &transaction.children {
            // Children outside the working set contribute nothing
            if !working.contains_key(child) {
                continue;
            }
            match scores.get(child) {
                Some(&score) => best_child = best_child.max(score),
                None => {
                    stack.push(*child);
                    ready = false;
                }
            }
        }
        if ready {
            scores.insert(
                hash,
                best_child + f64::from(transaction.sender_trust_score.value()),
            );
            stack.pop();
        }
    }
    scores.get(&root).copied().unwrap_or(0.0)
}
