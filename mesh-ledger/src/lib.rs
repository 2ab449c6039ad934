//! Meshnode ledger core
//!
//! Balance accounting, durable transaction storage, and cryptographic
//! primitives for a DAG-based ledger node.
//!
//! # Architecture
//!
//! - **Dual balance views**: durable balances change only at full
//!   confirmation; speculative balances also carry every admitted but
//!   unconfirmed transaction
//! - **Content addressing**: transactions and currencies are identified by
//!   32-byte hashes, accounts by checksummed addresses
//! - **Exact arithmetic**: Decimal for money
//! - **Hash-chained ordering**: the global transaction order is protected by
//!   a rolling accumulated hash

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod balance;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use balance::BalanceLedger;
pub use config::Config;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    Address, Hash, IndexConfirmation, IndexEntry, Signature, Transaction, TransactionKind,
    TransactionSummary, TransferLeg, TrustConfirmation, TrustScore,
};
