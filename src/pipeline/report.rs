//! End-of-run statistics report.

use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::ImportStats;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    #[serde(rename = "producedCount")]
    pub produced: u64,
    /// Records left in the queue by a previous run and drained by this one.
    #[serde(rename = "resumedCount")]
    pub resumed: u64,
    #[serde(rename = "consumedCount")]
    pub consumed: u64,
    #[serde(rename = "createdCount")]
    pub created: u64,
    #[serde(rename = "errorCount")]
    pub errors: u64,
    pub failed_batches: u64,
    pub retries: u64,
    #[serde(rename = "elapsedSeconds")]
    pub elapsed_secs: f64,
    #[serde(rename = "rateDocsPerSecond")]
    pub rate_docs_per_sec: f64,
    /// produced + resumed == consumed.
    pub consistent: bool,
    /// A wait deadline passed and workers were force-stopped; unread records stay queued.
    pub timed_out: bool,
}

impl StatsReport {
    pub fn new(produced: u64, resumed: u64, stats: &ImportStats, elapsed: Duration) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let rate_docs_per_sec = if elapsed_secs > 0.0 {
            stats.created as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            produced,
            resumed,
            consumed: stats.processed,
            created: stats.created,
            errors: stats.errors,
            failed_batches: stats.failed_batches,
            retries: stats.retries,
            elapsed_secs,
            rate_docs_per_sec,
            consistent: produced + resumed == stats.processed,
            timed_out: false,
        }
    }

    pub fn with_timed_out(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    /// Direct mode has no queue: every visited node counts as both produced and consumed.
    pub fn direct(stats: &ImportStats, elapsed: Duration) -> Self {
        Self::new(stats.processed, 0, stats, elapsed)
    }

    /// Log the summary, and the produced/consumed mismatch if any.
    pub fn log(&self) {
        if !self.consistent {
            warn!(
                "produced {} (+{} resumed) but consumed {}: {} record(s) possibly lost",
                self.produced,
                self.resumed,
                self.consumed,
                (self.produced + self.resumed).abs_diff(self.consumed)
            );
        }
        if self.timed_out {
            warn!("stopped at the wait deadline; unread records remain in the queue");
        }
        info!("{}", self);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "produced {}, consumed {}, created {}, errors {} in {:.2}s ({:.1} docs/s)",
            self.produced,
            self.consumed,
            self.created,
            self.errors,
            self.elapsed_secs,
            self.rate_docs_per_sec
        )?;
        if self.resumed > 0 {
            write!(f, ", {} resumed", self.resumed)?;
        }
        if self.retries > 0 {
            write!(f, ", {} retries", self.retries)?;
        }
        if self.timed_out {
            write!(f, ", timed out")?;
        }
        Ok(())
    }
}
