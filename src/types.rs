//! Public and internal types for the treeload API and pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::utils::config::{Defaults, WorkerThreadLimits};

/// One property value carried by a record. Externally tagged so encoding is lossless.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<String>),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Property map with unique, ordered keys.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Where the bytes behind a [`BlobRef`] live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobLocation {
    /// Content stays in the source file; the store keeps the reference.
    File(PathBuf),
    /// Content travels with the record (synthetic or small in-memory payloads).
    Inline(Vec<u8>),
}

/// Reference to binary content attached to a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Hex blake3 digest of the content.
    pub digest: String,
    pub length: u64,
    pub filename: String,
    pub mime_type: String,
    pub location: BlobLocation,
}

/// The unit placed on a queue partition: one create/update in the target store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Path of the parent document in the store (`/` for the store root).
    pub target_path: String,
    /// Document type (`Folder`, `File`, or a per-node override).
    pub doc_type: String,
    pub name: String,
    pub properties: Properties,
    pub payload: Option<BlobRef>,
}

impl Record {
    /// Full store path of the document this record creates.
    pub fn path(&self) -> String {
        join_store_path(&self.target_path, &self.name)
    }

    /// Partition key: the first `depth` segments of [`Self::path`]. Records in the same subtree
    /// below that depth share a key; shallower records key on their own path.
    pub fn partition_key(&self, depth: usize) -> String {
        let path = self.path();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let take = depth.max(1).min(segments.len());
        format!("/{}", segments[..take].join("/"))
    }
}

/// Join a store parent path and a child name with exactly one separator.
pub fn join_store_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    format!("{}/{}", parent, name.trim_start_matches('/'))
}

/// Number of non-empty segments in a store path (`/` has zero).
pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Per-worker import counters. Merging is associative and commutative: the merged value is the
/// field-wise sum regardless of order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    /// Records taken off the queue (or visited in direct mode).
    pub processed: u64,
    /// Records the sink acknowledged inside a committed batch.
    pub created: u64,
    /// Records dropped after retries were exhausted or a permanent failure.
    pub errors: u64,
    pub failed_batches: u64,
    pub retries: u64,
}

impl ImportStats {
    pub fn merge(&mut self, other: &ImportStats) {
        self.processed += other.processed;
        self.created += other.created;
        self.errors += other.errors;
        self.failed_batches += other.failed_batches;
        self.retries += other.retries;
    }
}

impl Add for ImportStats {
    type Output = ImportStats;

    fn add(mut self, rhs: ImportStats) -> ImportStats {
        self.merge(&rhs);
        self
    }
}

impl AddAssign for ImportStats {
    fn add_assign(&mut self, rhs: ImportStats) {
        self.merge(&rhs);
    }
}

impl Sum for ImportStats {
    fn sum<I: Iterator<Item = ImportStats>>(iter: I) -> ImportStats {
        iter.fold(ImportStats::default(), Add::add)
    }
}

impl<'a> Sum<&'a ImportStats> for ImportStats {
    fn sum<I: Iterator<Item = &'a ImportStats>>(iter: I) -> ImportStats {
        iter.fold(ImportStats::default(), |acc, s| acc + *s)
    }
}

/// Raw options as entered on the CLI or in `.treeload.toml`. Validated into [`ImporterConfig`].
#[derive(Clone, Debug)]
pub struct Opts {
    /// Document store path. When None, uses `<pkg>.db` in the working directory.
    pub store_path: Option<PathBuf>,
    /// Queue directory. When None, uses `TREELOAD_QUEUE_DIR` or the system temp dir.
    pub queue_dir: Option<PathBuf>,
    /// Store path under which the source root is created.
    pub target: String,
    /// Queue partitions (one consumer each). When None, derived from available threads.
    pub partitions: Option<i64>,
    /// Direct-mode task threads. When None, derived from available threads.
    pub threads: Option<i64>,
    pub batch_size: i64,
    pub batch_threshold_secs: u64,
    pub retry_max: i64,
    pub retry_delay_ms: u64,
    /// Seconds to wait for producers before forcing them to stop. None waits indefinitely.
    pub producer_timeout_secs: Option<u64>,
    /// Seconds allowed for the graceful consumer drain before forcing a stop.
    pub drain_timeout_secs: Option<u64>,
    /// Reopen existing partitions instead of resetting them.
    pub resume: bool,
    /// Exclude patterns (glob syntax) applied to filesystem sources.
    pub exclude: Vec<String>,
    /// Show progress and debug logging.
    pub verbose: bool,
    /// Print the final report as JSON.
    pub json: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            store_path: None,
            queue_dir: None,
            target: "/".to_string(),
            partitions: None,
            threads: None,
            batch_size: Defaults::BATCH_SIZE as i64,
            batch_threshold_secs: Defaults::BATCH_THRESHOLD.as_secs(),
            retry_max: Defaults::RETRY_MAX as i64,
            retry_delay_ms: Defaults::RETRY_DELAY.as_millis() as u64,
            producer_timeout_secs: None,
            drain_timeout_secs: None,
            resume: false,
            exclude: Vec::new(),
            verbose: false,
            json: false,
        }
    }
}

/// Validated settings shared by both import modes.
#[derive(Clone, Debug)]
pub struct ImporterConfig {
    /// Records per transactional batch (queue mode) or writes per commit (direct mode).
    pub batch_size: usize,
    /// A partial batch is applied once this much time passed since its first record.
    pub batch_threshold: Duration,
    pub retry_max: u32,
    pub retry_delay: Duration,
    /// Upper bound of one blocking poll; also how quickly consumers notice stop requests.
    pub poll_timeout: Duration,
    /// Sleep-poll cadence of the orchestrator waits.
    pub wait_interval: Duration,
    pub partitions: usize,
    pub threads: usize,
    /// Bound on the producer wait; None waits until producers finish or an interrupt.
    pub producer_timeout: Option<Duration>,
    /// Bound on the graceful consumer drain before escalating to forced stop.
    pub drain_timeout: Option<Duration>,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        let threads = WorkerThreadLimits::current().default_workers();
        Self {
            batch_size: Defaults::BATCH_SIZE,
            batch_threshold: Defaults::BATCH_THRESHOLD,
            retry_max: Defaults::RETRY_MAX,
            retry_delay: Defaults::RETRY_DELAY,
            poll_timeout: Defaults::POLL_TIMEOUT,
            wait_interval: Defaults::WAIT_INTERVAL,
            partitions: threads,
            threads,
            producer_timeout: None,
            drain_timeout: None,
        }
    }
}

impl ImporterConfig {
    /// Reject non-positive batch sizes.
    pub fn checked_batch_size(n: i64) -> Result<usize, ConfigError> {
        if n < 1 {
            return Err(ConfigError::InvalidBatchSize(n));
        }
        Ok(n as usize)
    }

    pub fn with_batch_size(mut self, n: i64) -> Result<Self, ConfigError> {
        self.batch_size = Self::checked_batch_size(n)?;
        Ok(self)
    }

    pub fn with_partitions(mut self, n: i64) -> Result<Self, ConfigError> {
        if n < 1 {
            return Err(ConfigError::InvalidPartitionCount(n));
        }
        self.partitions = n as usize;
        Ok(self)
    }

    pub fn with_threads(mut self, n: i64) -> Result<Self, ConfigError> {
        if n < 1 {
            return Err(ConfigError::InvalidThreadCount(n));
        }
        self.threads = n as usize;
        Ok(self)
    }

    pub fn with_retry(
        mut self,
        retry_max: i64,
        retry_delay: Duration,
    ) -> Result<Self, ConfigError> {
        if retry_max < 0 {
            return Err(ConfigError::InvalidRetryMax(retry_max));
        }
        self.retry_max = retry_max.min(u32::MAX as i64) as u32;
        self.retry_delay = retry_delay;
        Ok(self)
    }
}

impl TryFrom<&Opts> for ImporterConfig {
    type Error = ConfigError;

    fn try_from(o: &Opts) -> Result<Self, Self::Error> {
        let mut cfg = ImporterConfig::default()
            .with_batch_size(o.batch_size)?
            .with_retry(o.retry_max, Duration::from_millis(o.retry_delay_ms))?;
        cfg.batch_threshold = Duration::from_secs(o.batch_threshold_secs);
        cfg.producer_timeout = o.producer_timeout_secs.map(Duration::from_secs);
        cfg.drain_timeout = o.drain_timeout_secs.map(Duration::from_secs);
        if let Some(p) = o.partitions {
            cfg = cfg.with_partitions(p)?;
        }
        if let Some(t) = o.threads {
            cfg = cfg.with_threads(t)?;
        }
        Ok(cfg)
    }
}
