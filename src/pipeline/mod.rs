//! Queue-mode pipeline: orchestration, import hooks, end-of-run report.

pub mod filter;
pub mod orchestrator;
pub mod report;

pub use filter::{ImporterFilter, WalCheckpointFilter};
pub use orchestrator::{ImportOutcome, QueueImporter};
pub use report::StatsReport;
