//! Hooks run around an import.

use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::sink::sqlite::checkpoint_wal;

/// Runs before any worker starts and after every worker has exited.
///
/// A `before_import` error aborts the run. `after_import` always runs and receives the run's
/// error, if any; its own error is logged and never replaces the run's.
pub trait ImporterFilter: Send {
    fn before_import(&mut self) -> Result<()> {
        Ok(())
    }

    fn after_import(&mut self, _error: Option<&anyhow::Error>) -> Result<()> {
        Ok(())
    }
}

/// Truncates the document store's WAL once the import is over.
pub struct WalCheckpointFilter {
    store: PathBuf,
}

impl WalCheckpointFilter {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        Self {
            store: store.into(),
        }
    }
}

impl ImporterFilter for WalCheckpointFilter {
    fn after_import(&mut self, _error: Option<&anyhow::Error>) -> Result<()> {
        checkpoint_wal(&self.store)?;
        debug!("checkpointed WAL of {}", self.store.display());
        Ok(())
    }
}

/// Run every `before_import` in order; stop at the first failure.
pub(crate) fn run_before(filters: &mut [Box<dyn ImporterFilter>]) -> Result<()> {
    for f in filters.iter_mut() {
        f.before_import()?;
    }
    Ok(())
}

/// Run every `after_import`, logging failures.
pub(crate) fn run_after(filters: &mut [Box<dyn ImporterFilter>], error: Option<&anyhow::Error>) {
    for f in filters.iter_mut() {
        if let Err(e) = f.after_import(error) {
            log::warn!("post-import filter failed: {:#}", e);
        }
    }
}
