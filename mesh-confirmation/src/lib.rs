//! Meshnode Confirmation
//!
//! Confirmation machinery for the DAG ledger: the totally ordered transaction
//! index chain, the single-consumer pipeline that settles transactions when
//! both confirmation facets arrive, and cold-start replay.
//!
//! # Architecture
//!
//! - **Index chain**: Every indexed transaction extends a rolling accumulated
//!   hash, so equal last entries imply equal histories
//! - **Single consumer**: One pipeline task owns all confirmation-state
//!   writes and all durable balance commits
//! - **Out-of-order tolerance**: Index signals ahead of the chain are parked
//!   and replayed when the gap closes
//! - **Replay**: Startup re-verifies the whole chain from the genesis seed

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod index;
pub mod pipeline;
pub mod replay;

// Re-exports
pub use error::{Error, Result};
pub use index::{InsertOutcome, TransactionIndexService};
pub use pipeline::{
    spawn_confirmation_pipeline, ConfirmationHandle, ConfirmationHooks, ConfirmationPipeline,
    ConfirmationSignal, NoopHooks,
};
pub use replay::{load_existing_transactions, replay_index_chain};
