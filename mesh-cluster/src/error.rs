//! Error types for the cluster manager

use mesh_ledger::types::Hash;
use thiserror::Error;

/// Errors raised by DAG attachment and the trust-chain scan
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying ledger error (storage, serialization)
    #[error("Ledger error: {0}")]
    Ledger(#[from] mesh_ledger::Error),

    /// Error from the confirmation pipeline
    #[error("Confirmation error: {0}")]
    Confirmation(#[from] mesh_confirmation::Error),

    /// A declared parent exists neither in the working set nor in storage
    #[error("Unknown parent transaction: {0}")]
    UnknownParent(Hash),

    /// The source selector violated the two-parent contract
    #[error("Source selector returned {0} parents, at most 2 are allowed")]
    TooManyParents(usize),
}

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, Error>;
