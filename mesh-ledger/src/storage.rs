//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `transactions` - Transaction records (key: transaction hash)
//! - `index` - Hash-chained index entries (key: big-endian index)
//!
//! Index keys are big-endian so the default iteration order is the chain
//! order, which cold-start replay and latest-entry lookup rely on.

use crate::{
    error::{Error, Result},
    types::{Hash, IndexEntry, Transaction},
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDEX: &str = "index";

/// Number of stripes in the per-record lock table
const RECORD_LOCK_STRIPES: usize = 64;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    /// Striped locks serializing read-modify-write cycles per record
    record_locks: Vec<Mutex<()>>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        // Enable statistics
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_INDEX, Self::cf_options_index()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let record_locks = (0..RECORD_LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        tracing::info!(
            "Opened RocksDB at {:?} with {} column families",
            path,
            db.cf_handle(CF_TRANSACTIONS).is_some() as usize
                + db.cf_handle(CF_INDEX).is_some() as usize
        );

        Ok(Self {
            db: Arc::new(db),
            record_locks,
        })
    }

    // Column family options

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        // Replay scans the whole chain sequentially, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn record_lock(&self, hash: &Hash) -> &Mutex<()> {
        let stripe = hash.as_bytes()[0] as usize % RECORD_LOCK_STRIPES;
        &self.record_locks[stripe]
    }

    // Transaction operations

    /// Put transaction record
    pub fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = bincode::serialize(transaction)?;

        self.db.put_cf(cf, transaction.hash.as_bytes(), &value)?;

        tracing::debug!(hash = %transaction.hash, "Transaction stored");

        Ok(())
    }

    /// Get transaction by hash
    pub fn get_transaction(&self, hash: &Hash) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        match self.db.get_cf(cf, hash.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Check whether a transaction record exists
    pub fn contains_transaction(&self, hash: &Hash) -> Result<bool> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        Ok(self.db.get_pinned_cf(cf, hash.as_bytes())?.is_some())
    }

    /// Atomically read, modify, and write one transaction record
    ///
    /// The record lock keeps two concurrent modifications of the same hash
    /// from losing updates. Returns the updated record.
    pub fn update_transaction<F>(&self, hash: &Hash, f: F) -> Result<Transaction>
    where
        F: FnOnce(&mut Transaction),
    {
        let _guard = self.record_lock(hash).lock();

        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, hash.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(hash.to_string()))?;

        let mut transaction: Transaction = bincode::deserialize(&value)?;
        f(&mut transaction);

        self.db
            .put_cf(cf, hash.as_bytes(), bincode::serialize(&transaction)?)?;

        Ok(transaction)
    }

    /// Write a transaction and its updated parent records in one batch
    ///
    /// Parent records are read and modified under their record locks and
    /// written together with the new record atomically, so a failure on any
    /// parent leaves every record untouched. Stripe locks are taken in
    /// ascending order so concurrent group writes cannot deadlock.
    pub fn put_transaction_with_parents<F>(
        &self,
        transaction: &Transaction,
        mut update_parent: F,
    ) -> Result<Vec<Transaction>>
    where
        F: FnMut(&mut Transaction),
    {
        let parent_hashes: Vec<Hash> = transaction.parents().collect();

        let mut stripes: Vec<usize> = parent_hashes
            .iter()
            .map(|hash| hash.as_bytes()[0] as usize % RECORD_LOCK_STRIPES)
            .collect();
        stripes.sort_unstable();
        stripes.dedup();
        let _guards: Vec<_> = stripes
            .iter()
            .map(|stripe| self.record_locks[*stripe].lock())
            .collect();

        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let mut parents = Vec::with_capacity(parent_hashes.len());
        for hash in &parent_hashes {
            let value = self
                .db
                .get_cf(cf, hash.as_bytes())?
                .ok_or_else(|| Error::TransactionNotFound(hash.to_string()))?;
            parents.push(bincode::deserialize::<Transaction>(&value)?);
        }

        for parent in &mut parents {
            update_parent(parent);
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf, transaction.hash.as_bytes(), bincode::serialize(transaction)?);
        for parent in &parents {
            batch.put_cf(cf, parent.hash.as_bytes(), bincode::serialize(parent)?);
        }
        self.db.write(batch)?;

        Ok(parents)
    }

    /// Iterate over all stored transactions
    pub fn transactions(&self) -> Result<impl Iterator<Item = Result<Transaction>> + '_> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        Ok(self
            .db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| -> Result<Transaction> {
                let (_, value) = item?;
                Ok(bincode::deserialize(&value)?)
            }))
    }

    /// Approximate number of stored transactions
    pub fn transaction_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        // RocksDB property for approximate count
        let count = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(count)
    }

    // Index chain operations

    /// Put index entry
    pub fn put_index_entry(&self, entry: &IndexEntry) -> Result<()> {
        let cf = self.cf_handle(CF_INDEX)?;
        let key = entry.index.to_be_bytes();
        let value = bincode::serialize(entry)?;

        self.db.put_cf(cf, key, &value)?;

        Ok(())
    }

    /// Get index entry by position
    pub fn get_index_entry(&self, index: u64) -> Result<Option<IndexEntry>> {
        let cf = self.cf_handle(CF_INDEX)?;
        let key = index.to_be_bytes();

        match self.db.get_cf(cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get the highest stored index entry
    pub fn latest_index_entry(&self) -> Result<Option<IndexEntry>> {
        let cf = self.cf_handle(CF_INDEX)?;

        let iter = self.db.iterator_cf(cf, IteratorMode::End);

        for item in iter {
            let (_, value) = item?;
            let entry: IndexEntry = bincode::deserialize(&value)?;
            return Ok(Some(entry));
        }

        Ok(None)
    }

    /// Iterate index entries in chain order, starting at `start`
    pub fn index_entries_from(
        &self,
        start: u64,
    ) -> Result<impl Iterator<Item = Result<IndexEntry>> + '_> {
        let cf = self.cf_handle(CF_INDEX)?;
        let key = start.to_be_bytes();

        Ok(self
            .db
            .iterator_cf(cf, IteratorMode::From(&key, Direction::Forward))
            .map(|item| -> Result<IndexEntry> {
                let (_, value) = item?;
                Ok(bincode::deserialize(&value)?)
            }))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}
