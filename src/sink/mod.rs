//! Write targets for imported records.
//!
//! A [`RecordSink`] is one session on the store and is owned by exactly one worker thread;
//! [`SinkFactory`] hands every worker its own session.

pub mod factory;
pub mod sqlite;

pub use factory::DocumentFactory;
pub use sqlite::{SqliteSink, SqliteSinkFactory, StoredDocument};

use crate::Record;
use crate::error::SinkResult;

/// Store-assigned identifier of a created or updated document.
pub type DocId = i64;

/// One store session. Calls between `begin_batch` and `commit_batch` form one transaction;
/// at most one transaction is open per sink at a time.
pub trait RecordSink: Send {
    fn begin_batch(&mut self) -> SinkResult<()>;

    fn create_or_update(&mut self, record: &Record) -> SinkResult<DocId>;

    fn commit_batch(&mut self) -> SinkResult<()>;

    fn rollback_batch(&mut self) -> SinkResult<()>;
}

/// Opens a fresh sink per worker. Shared across threads; sinks themselves are not.
pub trait SinkFactory: Send + Sync {
    fn open(&self) -> SinkResult<Box<dyn RecordSink>>;
}
