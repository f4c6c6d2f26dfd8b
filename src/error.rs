//! Typed errors for the queue, sink and configuration layers.
//!
//! Orchestration code works with `anyhow::Result`; these enums exist where callers need to
//! branch on the failure kind (retry a transient sink error, reject a config value).

use thiserror::Error;

/// Failures of the partitioned queue. Storage failures are never retried at this layer.
#[derive(Error, Debug)]
pub enum QueueError {
    /// `init` called twice without `close`
    #[error("queue manager is already initialized, close() it first")]
    AlreadyInitialized,

    /// put/poll before `init`
    #[error("queue manager is not initialized")]
    NotInitialized,

    /// Partition index out of range
    #[error("no partition {partition} (queue has {count})")]
    NoSuchPartition { partition: usize, count: usize },

    /// Storage could not be read or written
    #[error("partition {partition} I/O failure: {source}")]
    Io {
        partition: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Filesystem failure while creating or resetting partition files
    #[error("queue directory error: {0}")]
    Dir(#[from] std::io::Error),

    /// A record could not be encoded or a stored body could not be decoded
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Failures reported by a [`RecordSink`](crate::sink::RecordSink).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Worth retrying: busy/locked store, lost connection.
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// Retrying will not help: constraint violation, bad data.
    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

impl From<rusqlite::Error> for SinkError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                SinkError::Transient(e.to_string())
            }
            _ => SinkError::Permanent(e.to_string()),
        }
    }
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Rejected configuration values (checked before any work starts).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch size must be at least 1, got {0}")]
    InvalidBatchSize(i64),

    #[error("partition count must be at least 1, got {0}")]
    InvalidPartitionCount(i64),

    #[error("thread count must be at least 1, got {0}")]
    InvalidThreadCount(i64),

    #[error("retry max must not be negative, got {0}")]
    InvalidRetryMax(i64),
}

/// Run-level failures surfaced by the orchestrators.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Interrupted while waiting on workers; workers were force-stopped first.
    #[error("import interrupted; workers were forcibly stopped")]
    Interrupted,

    /// A pre-import filter failed; no worker was started.
    #[error("pre-import filter failed: {0}")]
    PreImportHook(String),

    /// One or more worker threads returned an error or panicked.
    #[error("{failed} worker(s) failed during import")]
    WorkersFailed { failed: usize },
}
