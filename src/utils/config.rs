//! Application configuration constants.
//! Tuning, defaults and thresholds in one place.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::utils::fd_limit::max_workers_by_fd_limit;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    store_filename: String,
    settings_filename: String,
    queue_dir_name: String,
    queue_dir_env: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                store_filename: format!("{pkg}.db"),
                settings_filename: format!(".{pkg}.toml"),
                queue_dir_name: format!("{pkg}-queue"),
                queue_dir_env: format!("{}_QUEUE_DIR", pkg.to_uppercase()),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Default document store filename (created in the working directory).
    pub fn store_filename(&self) -> &str {
        &self.store_filename
    }

    /// Optional settings file looked up in the working directory.
    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }

    /// Environment variable overriding the queue directory.
    pub fn queue_dir_env(&self) -> &str {
        &self.queue_dir_env
    }

    /// Queue directory: `$<PKG>_QUEUE_DIR` if set, else `<tmp>/<pkg>-queue`.
    pub fn default_queue_dir(&self) -> PathBuf {
        std::env::var_os(&self.queue_dir_env)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(&self.queue_dir_name))
    }
}

// ---- Worker threads ----

/// Thread limits for partition and task-pool sizing.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Floor for any derived worker count.
    pub floor: usize,
    /// Ceiling for derived worker counts (explicit settings may exceed it).
    pub max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
            max: Self::MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 2;
    pub const MAX_THREADS: usize = 16;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Derived worker count: available threads clamped to `[floor, max]`, then capped so the
    /// open partition files and sink connections stay under the FD budget.
    pub fn default_workers(&self) -> usize {
        let n = self.all_threads.clamp(self.floor, self.max);
        match max_workers_by_fd_limit() {
            Some(cap) => n.min(cap).max(1),
            None => n,
        }
    }
}

// ---- Import defaults ----

/// Defaults for batch, retry and wait policies.
pub struct Defaults;

impl Defaults {
    /// Records per transactional batch.
    pub const BATCH_SIZE: usize = 10;
    /// Apply a partial batch once its first record is this old.
    pub const BATCH_THRESHOLD: Duration = Duration::from_secs(20);
    /// Extra attempts for a failing batch.
    pub const RETRY_MAX: u32 = 3;
    pub const RETRY_DELAY: Duration = Duration::from_secs(2);
    /// Upper bound of a single blocking poll.
    pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);
    /// Orchestrator sleep-poll cadence.
    pub const WAIT_INTERVAL: Duration = Duration::from_millis(100);
    /// Records per synthetic folder for the random producer.
    pub const RANDOM_FOLDER_SIZE: usize = 1000;
    /// Average synthetic blob size (KB).
    pub const RANDOM_BLOB_KB: usize = 1;
}

// ---- Direct mode ----

/// Threading-policy thresholds for direct traversal.
pub struct ForkConsts;

impl ForkConsts {
    /// No fork while fewer than `batch_size / UPLOAD_DIVISOR` documents were written by the task.
    pub const UPLOAD_DIVISOR: u64 = 3;
    /// No fork once this many tasks wait in the pool backlog.
    pub const MAX_BACKLOG: usize = 5;
    /// Per-task created counts are published to the registry every this many writes.
    pub const REGISTRY_PUBLISH_EVERY: u64 = 10;
}

// ---- Blob digests ----

/// Blob digest I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}

// ---- SQLite ----

/// How long a store or partition connection waits on a competing writer before reporting busy.
pub const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
