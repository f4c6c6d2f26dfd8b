//! CLI command handler: resolve settings, run the selected import, print the report.

use anyhow::{Context, Result};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::progress::{create_counter, progress_callback, refresh_bar};
use crate::import::{RunHooks, import_random_queued, import_tree_direct, import_tree_queued};
use crate::pipeline::ImportOutcome;
use crate::source::{FsNode, RandomNode, RandomTreeSpec};
use crate::utils::config::Defaults;
use crate::utils::settings_toml::{apply_file_to_opts, load_settings_toml};
use crate::utils::setup_logging;
use crate::worker::RandomDocsSpec;
use crate::Opts;

/// Defaults, then `.env` and `.treeload.toml` in the working directory, then CLI flags.
fn setup_opts(cli: &Cli) -> Result<Opts> {
    let _ = dotenvy::dotenv();
    let mut opts = Opts::default();
    let cwd = std::env::current_dir().context("resolve working directory")?;
    if let Some(file) = load_settings_toml(&cwd) {
        apply_file_to_opts(&file, &mut opts);
    }
    cli.command.common().apply_to(&mut opts);
    setup_logging(opts.verbose);
    Ok(opts)
}

/// Ctrl-C raises the returned flag; the importers force-stop their workers when they see it.
fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;
    Ok(flag)
}

fn random_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random)
}

/// Documents per folder so a `depth`/`fanout` tree holds at least `documents`.
/// Folder counts saturate instead of overflowing for very deep or wide trees.
pub fn documents_per_folder(documents: usize, depth: usize, fanout: usize) -> usize {
    let folders = (0..depth.max(1))
        .map(|l| fanout.saturating_pow(l.min(u32::MAX as usize) as u32))
        .fold(0usize, usize::saturating_add);
    documents.div_ceil(folders.max(1))
}

/// Run the selected subcommand. The report is printed even when the import failed.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = setup_opts(cli)?;
    let bar = opts.verbose.then(|| create_counter("imported"));
    let hooks = RunHooks {
        interrupt: Some(install_interrupt_handler()?),
        on_batch: progress_callback(&bar),
    };

    let outcome: ImportOutcome = match &cli.command {
        Commands::Queue { source, .. } => {
            debug!("queue import of {}", source.display());
            let root = FsNode::open(source, opts.exclude.clone())?;
            import_tree_queued(Box::new(root), &opts, hooks)?
        }
        Commands::Direct { source, .. } => {
            debug!("direct import of {}", source.display());
            let root = FsNode::open(source, opts.exclude.clone())?;
            import_tree_direct(Box::new(root), &opts, hooks)?
        }
        Commands::Random {
            documents,
            producers,
            direct,
            depth,
            fanout,
            blob_kb,
            seed,
            ..
        } => {
            let seed = random_seed(*seed);
            debug!("random import: {} document(s), seed {}", documents, seed);
            if *direct {
                let spec = RandomTreeSpec {
                    depth: (*depth).max(1),
                    folders: *fanout,
                    documents: documents_per_folder(*documents, *depth, *fanout),
                    avg_blob_size: blob_kb * 1024,
                    seed,
                };
                import_tree_direct(Box::new(RandomNode::root(spec)), &opts, hooks)?
            } else {
                let spec = RandomDocsSpec {
                    target: opts.target.clone(),
                    documents: *documents,
                    folder_size: Defaults::RANDOM_FOLDER_SIZE,
                    avg_blob_size: blob_kb * 1024,
                    seed,
                };
                import_random_queued(spec, *producers, &opts, hooks)?
            }
        }
    };

    if let Some(bar) = &bar {
        refresh_bar(bar);
        eprintln!();
    }
    if opts.json {
        println!("{}", outcome.report.to_json()?);
    } else {
        println!("{}", outcome.report);
    }
    outcome.into_result().map(|_| ())
}
