//! Persistent partitioned queue between producers and consumers.
//!
//! Each partition is an independent FIFO lane backed by its own SQLite file under the queue
//! directory. Any number of producers may dispatch concurrently; each partition must be drained
//! by at most one consumer at a time.

pub mod codec;
pub mod partition;

pub use partition::{SqlitePartition, partition_filename};

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::Record;
use crate::error::{QueueError, QueueResult};

/// How `init` treats partitions left by a previous run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Delete existing partition files and start empty.
    #[default]
    Reset,
    /// Reopen existing partitions and continue from their stored read cursors.
    Resume,
}

/// Owns the partitions of one queue directory and routes records to them.
///
/// Routing hashes [`Record::partition_key`] at `key_depth` with blake3, so every record of a
/// subtree rooted at that depth lands on the same partition, in dispatch order.
pub struct QueueManager {
    dir: PathBuf,
    key_depth: usize,
    partitions: RwLock<Vec<Arc<SqlitePartition>>>,
}

impl QueueManager {
    pub fn new(dir: impl Into<PathBuf>, key_depth: usize) -> Self {
        Self {
            dir: dir.into(),
            key_depth: key_depth.max(1),
            partitions: RwLock::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_depth(&self) -> usize {
        self.key_depth
    }

    /// Create (or reopen, per `mode`) `count` partitions. Fails if already initialized.
    pub fn init(&self, count: usize, mode: OpenMode) -> QueueResult<()> {
        let mut guard = self.partitions.write().unwrap_or_else(|e| e.into_inner());
        if !guard.is_empty() {
            return Err(QueueError::AlreadyInitialized);
        }
        std::fs::create_dir_all(&self.dir)?;

        let mut opened = Vec::with_capacity(count);
        for index in 0..count {
            let path = self.dir.join(partition_filename(index));
            if mode == OpenMode::Reset {
                partition::remove_partition_files(&path)?;
            }
            let p = SqlitePartition::open(index, &path)
                .map_err(|source| QueueError::Io { partition: index, source })?;
            if mode == OpenMode::Resume {
                let pending = p
                    .pending()
                    .map_err(|source| QueueError::Io { partition: index, source })?;
                if pending > 0 {
                    info!("partition {} resumes with {} pending record(s)", index, pending);
                }
            }
            opened.push(Arc::new(p));
        }

        let stale = self.dir.join(partition_filename(count));
        if mode == OpenMode::Resume && stale.exists() {
            warn!(
                "{} exists but the queue now has {} partitions; its records will not be drained",
                stale.display(),
                count
            );
        }

        debug!("queue initialized: {} partitions in {}", count, self.dir.display());
        *guard = opened;
        Ok(())
    }

    /// Release all partitions. Stored records survive and can be resumed.
    pub fn close(&self) {
        let mut guard = self.partitions.write().unwrap_or_else(|e| e.into_inner());
        guard.clear();
    }

    pub fn is_initialized(&self) -> bool {
        !self.read().is_empty()
    }

    pub fn partition_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<SqlitePartition>>> {
        self.partitions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn partition(&self, index: usize) -> QueueResult<Arc<SqlitePartition>> {
        let guard = self.read();
        if guard.is_empty() {
            return Err(QueueError::NotInitialized);
        }
        guard
            .get(index)
            .cloned()
            .ok_or(QueueError::NoSuchPartition {
                partition: index,
                count: guard.len(),
            })
    }

    /// Partition a record routes to among `count` partitions.
    pub fn route(&self, record: &Record, count: usize) -> usize {
        partition_for_key(&record.partition_key(self.key_depth), count)
    }

    /// Route and append a record. Returns the partition it was written to.
    pub fn dispatch(&self, record: &Record) -> QueueResult<usize> {
        let count = self.partition_count();
        if count == 0 {
            return Err(QueueError::NotInitialized);
        }
        let index = self.route(record, count);
        self.put(index, record)?;
        Ok(index)
    }

    /// Append to an explicit partition.
    pub fn put(&self, index: usize, record: &Record) -> QueueResult<()> {
        let body = codec::encode(record)?;
        self.partition(index)?
            .append(&body)
            .map_err(|source| QueueError::Io { partition: index, source })
    }

    /// Next record of `index` in dispatch order, waiting up to `timeout`. None on timeout.
    pub fn poll(&self, index: usize, timeout: Duration) -> QueueResult<Option<Record>> {
        let body = self
            .partition(index)?
            .take(timeout)
            .map_err(|source| QueueError::Io { partition: index, source })?;
        body.map(|b| codec::decode(&b)).transpose()
    }

    /// Unread records in a partition (monitoring only).
    pub fn size(&self, index: usize) -> QueueResult<u64> {
        self.partition(index)?
            .pending()
            .map_err(|source| QueueError::Io { partition: index, source })
    }

    pub fn is_empty(&self, index: usize) -> QueueResult<bool> {
        Ok(self.size(index)? == 0)
    }

    /// Unread records over all partitions.
    pub fn total_size(&self) -> QueueResult<u64> {
        (0..self.partition_count()).map(|i| self.size(i)).sum()
    }
}

/// Stable partition index for a key: first 8 bytes of its blake3 hash, modulo `count`.
pub fn partition_for_key(key: &str, count: usize) -> usize {
    let hash = blake3::hash(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(head) % count.max(1) as u64) as usize
}
