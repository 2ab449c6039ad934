//! Meshnode Cluster
//!
//! DAG management for the ledger node: attachment of new transactions,
//! trust-score source buckets for parent selection, and the periodic scan
//! that detects trust-chain consensus and feeds the confirmation pipeline.
//!
//! # Architecture
//!
//! - **Working set**: Transactions awaiting trust-chain consensus
//! - **Source buckets**: 101 per-trust-score lists of attachable sources
//! - **Incremental counters**: Source count moves on every transition and is
//!   never recounted
//! - **Pluggable policies**: Parent selection and trust-chain detection are
//!   trait objects

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod manager;
pub mod policy;
pub mod scan;

// Re-exports
pub use error::{Error, Result};
pub use manager::{ClusterManager, MAX_PARENTS};
pub use policy::{
    CumulativeTrustEngine, NeighborhoodSelector, SourceCandidate, SourceSelector, TrustChainEngine,
};
pub use scan::{spawn_trust_chain_scan, ScanHandle};
