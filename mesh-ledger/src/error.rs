//! Error types for the ledger core

use crate::types::{Address, Hash};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Malformed or mis-sized hash
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Address failed checksum or length validation
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Trust score outside the 0..=100 range
    #[error("Invalid trust score: {0}")]
    InvalidTrustScore(u8),

    /// A balance view holds a negative amount
    #[error("Negative balance {amount} for address {address} currency {currency}")]
    NegativeBalance {
        /// Offending address
        address: Address,
        /// Offending currency
        currency: Hash,
        /// The negative amount found
        amount: Decimal,
    },

    /// Snapshot loading hit an address/currency pair that is already funded
    #[error("Snapshot entry already exists for address {address} currency {currency}")]
    SnapshotEntryExists {
        /// Duplicated address
        address: Address,
        /// Duplicated currency
        currency: Hash,
    },

    /// Snapshot file could not be read or parsed
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
