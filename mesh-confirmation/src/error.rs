//! Error types for the confirmation pipeline

use mesh_ledger::types::Hash;
use thiserror::Error;

/// Errors raised by the index service, the pipeline and cold-start replay
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying ledger error (storage, serialization, balances)
    #[error("Ledger error: {0}")]
    Ledger(#[from] mesh_ledger::Error),

    /// An index signal claimed an index the chain has already passed
    #[error("Index {claimed} is behind the expected index {expected}")]
    IndexBehind {
        /// Index carried by the rejected signal
        claimed: u64,
        /// Next index the chain will accept
        expected: u64,
    },

    /// Recomputed accumulated hash disagrees with the stored entry
    #[error("Accumulated hash mismatch at index {index}")]
    AccumulatedHashMismatch {
        /// First index at which the chain diverges
        index: u64,
    },

    /// The index chain has a hole where an entry should be
    #[error("Index entry {index} missing from storage")]
    MissingIndexEntry {
        /// Index of the missing entry
        index: u64,
    },

    /// The index chain names a transaction that was never loaded
    #[error("Transaction {hash} at index {index} missing from the loaded set")]
    MissingIndexedTransaction {
        /// Index of the dangling entry
        index: u64,
        /// Transaction hash the entry points at
        hash: Hash,
    },

    /// Submission attempted after shutdown has begun
    #[error("Confirmation pipeline is shutting down")]
    ShuttingDown,

    /// Concurrency error (closed mailbox or response channel)
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

/// Result type alias for confirmation operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::IndexBehind {
            claimed: 3,
            expected: 7,
        };
        assert_eq!(
            err.to_string(),
            "Index 3 is behind the expected index 7"
        );

        let err = Error::AccumulatedHashMismatch { index: 2 };
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn test_ledger_error_conversion() {
        let ledger_err = mesh_ledger::Error::TransactionNotFound("abc".to_string());
        let err: Error = ledger_err.into();
        assert!(matches!(err, Error::Ledger(_)));
    }
}
