//! Import entry points: build the importer for a mode from [`Opts`] and run it.

use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::pipeline::{ImportOutcome, QueueImporter, WalCheckpointFilter};
use crate::queue::{OpenMode, QueueManager};
use crate::sink::{SinkFactory, SqliteSinkFactory};
use crate::source::NodeBox;
use crate::traversal::DirectImporter;
use crate::utils::config::PackagePaths;
use crate::worker::consumer::BatchCallback;
use crate::worker::{RandomDocsSpec, RandomProducer, TreeProducer};
use crate::{ImporterConfig, Opts, path_depth};

/// Optional run-time hooks supplied by the caller (CLI: ctrl-c flag and progress counter).
#[derive(Clone, Default)]
pub struct RunHooks {
    pub interrupt: Option<Arc<AtomicBool>>,
    pub on_batch: Option<BatchCallback>,
}

/// Store database for `opts`: `--store`, else `treeload.db` in the working directory.
pub fn store_path(opts: &Opts) -> PathBuf {
    opts.store_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(PackagePaths::get().store_filename()))
}

/// Queue directory for `opts`: `--queue-dir`, else the env/temp default.
pub fn queue_dir(opts: &Opts) -> PathBuf {
    opts.queue_dir
        .clone()
        .unwrap_or_else(|| PackagePaths::get().default_queue_dir())
}

fn log_config(opts: &Opts, config: &ImporterConfig) {
    debug!(
        "{} CONFIG:{:#?} {:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts,
        config
    );
}

fn queue_importer(
    opts: &Opts,
    config: ImporterConfig,
    key_depth: usize,
    hooks: RunHooks,
) -> Result<QueueImporter> {
    let store = store_path(opts);
    let sinks: Arc<dyn SinkFactory> = Arc::new(SqliteSinkFactory::new(&store)?);
    let queue = Arc::new(QueueManager::new(queue_dir(opts), key_depth));
    let mode = if opts.resume {
        OpenMode::Resume
    } else {
        OpenMode::Reset
    };
    let mut importer = QueueImporter::new(config, queue, sinks)
        .with_open_mode(mode)
        .with_filter(Box::new(WalCheckpointFilter::new(store)))
        .with_batch_callback(hooks.on_batch);
    if let Some(flag) = hooks.interrupt {
        importer = importer.with_interrupt(flag);
    }
    Ok(importer)
}

/// Import `root` under `opts.target` through the partitioned queue.
///
/// Records are keyed on their top-level subtree below the source root, so each such subtree
/// is drained by one consumer in traversal order.
pub fn import_tree_queued(root: NodeBox, opts: &Opts, hooks: RunHooks) -> Result<ImportOutcome> {
    let config = ImporterConfig::try_from(opts).context("invalid import settings")?;
    log_config(opts, &config);
    let mut importer = queue_importer(opts, config, path_depth(&opts.target) + 2, hooks)?;
    let producer = TreeProducer::new(root, opts.target.clone(), Arc::clone(importer.queue()));
    Ok(importer.run(vec![producer]))
}

/// Import synthetic documents with `producers` threads through the partitioned queue. Each
/// synthetic folder is one partition key.
pub fn import_random_queued(
    spec: RandomDocsSpec,
    producers: usize,
    opts: &Opts,
    hooks: RunHooks,
) -> Result<ImportOutcome> {
    let config = ImporterConfig::try_from(opts).context("invalid import settings")?;
    log_config(opts, &config);
    let mut importer = queue_importer(opts, config, path_depth(&spec.target) + 1, hooks)?;
    let workers = RandomProducer::split(spec, producers, importer.queue());
    Ok(importer.run(workers))
}

/// Import `root` under `opts.target` with direct multi-threaded traversal.
pub fn import_tree_direct(root: NodeBox, opts: &Opts, hooks: RunHooks) -> Result<ImportOutcome> {
    let config = ImporterConfig::try_from(opts).context("invalid import settings")?;
    log_config(opts, &config);
    let store = store_path(opts);
    let sinks: Arc<dyn SinkFactory> = Arc::new(SqliteSinkFactory::new(&store)?);
    let mut importer =
        DirectImporter::new(config, sinks).with_filter(Box::new(WalCheckpointFilter::new(store)));
    if let Some(flag) = hooks.interrupt {
        importer = importer.with_interrupt(flag);
    }
    Ok(importer.run(root, &opts.target))
}
