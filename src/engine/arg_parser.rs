use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::Opts;
use crate::utils::config::Defaults;

/// Bulk importer for hierarchical sources: queue-decoupled or direct multi-threaded traversal.
#[derive(Clone, Parser)]
#[command(name = "treeload")]
#[command(about = "Import a directory tree (or synthetic documents) into a document store.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Traverse SOURCE into a partitioned on-disk queue drained by one consumer per partition.
    Queue {
        /// Directory to import.
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Traverse SOURCE with a pool of threads writing to the store as they go.
    Direct {
        /// Directory to import.
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Import synthetic text documents.
    Random {
        /// Number of documents to generate.
        #[arg(long, short = 'n')]
        documents: usize,

        /// Producer threads splitting the documents (queue mode).
        #[arg(long, default_value_t = 1)]
        producers: usize,

        /// Generate a folder tree and import it in direct mode instead.
        #[arg(long)]
        direct: bool,

        /// Folder depth of the generated tree (direct mode).
        #[arg(long, default_value_t = 3)]
        depth: usize,

        /// Sub-folders per folder of the generated tree (direct mode).
        #[arg(long, default_value_t = 4)]
        fanout: usize,

        /// Average document size in KB.
        #[arg(long, default_value_t = Defaults::RANDOM_BLOB_KB)]
        blob_kb: usize,

        /// Seed for reproducible content. Default: random.
        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        common: CommonArgs,
    },
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Queue { common, .. }
            | Commands::Direct { common, .. }
            | Commands::Random { common, .. } => common,
        }
    }
}

/// Flags shared by every subcommand. Unset flags leave settings-file values in place.
#[derive(Clone, Debug, Default, Args)]
pub struct CommonArgs {
    /// Document store database. Default: `treeload.db` in the working directory.
    #[arg(long, short = 's')]
    pub store: Option<PathBuf>,

    /// Queue directory. Default: $TREELOAD_QUEUE_DIR or the system temp dir.
    #[arg(long)]
    pub queue_dir: Option<PathBuf>,

    /// Queue partitions (one consumer thread each).
    #[arg(long, short = 'p', allow_negative_numbers = true)]
    pub partitions: Option<i64>,

    /// Direct-mode task threads.
    #[arg(long, short = 't', allow_negative_numbers = true)]
    pub threads: Option<i64>,

    /// Records per transaction.
    #[arg(long, short = 'b', allow_negative_numbers = true)]
    pub batch_size: Option<i64>,

    /// Seconds after which a partial batch is committed.
    #[arg(long)]
    pub batch_threshold: Option<u64>,

    /// Retries of a failed batch before it is counted as errors.
    #[arg(long, allow_negative_numbers = true)]
    pub retry_max: Option<i64>,

    /// Delay between batch retries, in milliseconds.
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// Seconds to wait for producers before forcing them to stop.
    #[arg(long)]
    pub producer_timeout: Option<u64>,

    /// Seconds allowed for consumers to drain the queue before forcing them to stop.
    #[arg(long)]
    pub drain_timeout: Option<u64>,

    /// Reopen the queue left by a previous run instead of resetting it.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub resume: Option<bool>,

    /// Store path the source root is created under.
    #[arg(long)]
    pub target: Option<String>,

    /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2 pattern3
    #[arg(long, short = 'e', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Print the final report as JSON.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Verbose output and progress counter.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl CommonArgs {
    /// Overwrite `opts` with every flag given on the command line.
    pub fn apply_to(&self, opts: &mut Opts) {
        if self.store.is_some() {
            opts.store_path = self.store.clone();
        }
        if self.queue_dir.is_some() {
            opts.queue_dir = self.queue_dir.clone();
        }
        if self.partitions.is_some() {
            opts.partitions = self.partitions;
        }
        if self.threads.is_some() {
            opts.threads = self.threads;
        }
        if let Some(v) = self.batch_size {
            opts.batch_size = v;
        }
        if let Some(v) = self.batch_threshold {
            opts.batch_threshold_secs = v;
        }
        if let Some(v) = self.retry_max {
            opts.retry_max = v;
        }
        if let Some(v) = self.retry_delay {
            opts.retry_delay_ms = v;
        }
        if self.producer_timeout.is_some() {
            opts.producer_timeout_secs = self.producer_timeout;
        }
        if self.drain_timeout.is_some() {
            opts.drain_timeout_secs = self.drain_timeout;
        }
        if let Some(v) = self.resume {
            opts.resume = v;
        }
        if let Some(t) = &self.target {
            opts.target = t.clone();
        }
        if !self.exclude.is_empty() {
            opts.exclude = self.exclude.clone();
        }
        if let Some(v) = self.json {
            opts.json = v;
        }
        if let Some(v) = self.verbose {
            opts.verbose = v;
        }
    }
}
