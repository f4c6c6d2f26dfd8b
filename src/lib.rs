//! Treeload: bulk importer for hierarchical sources
//!
//! Two modes share one sink abstraction and one statistics model:
//! - **queue**: producers traverse the source and dispatch records onto a persistent partitioned
//!   queue; one consumer per partition applies them in transactional batches with retries.
//! - **direct**: traversal tasks write as they walk and hand subtrees to a thread pool under a
//!   [`ThreadingPolicy`](traversal::ThreadingPolicy).

pub mod engine;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod source;
pub mod traversal;
pub mod types;
pub mod utils;
pub mod worker;

/// Re-export types for API
pub use types::*;

pub use import::{RunHooks, import_random_queued, import_tree_direct, import_tree_queued};
pub use pipeline::{ImportOutcome, QueueImporter, StatsReport};
pub use traversal::DirectImporter;

/// Result alias used by public treeload API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
