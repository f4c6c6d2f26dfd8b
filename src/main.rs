//! Treeload CLI: import a directory tree or synthetic documents into a document store.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use treeload::engine::arg_parser::Cli;
use treeload::engine::handle_run;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
