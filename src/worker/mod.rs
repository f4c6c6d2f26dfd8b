//! Worker threads shared by both roles of the queue pipeline.
//!
//! Producers and consumers run the same stop protocol: a [`WorkerControl`] holds the state
//! (`Running` → `StopGraceful` / `StopForced` → `Terminated`) and the processed counter, and the
//! [`WorkerPool`] owning the thread inspects the worker's `Result` (or panic) when it exits.

pub mod consumer;
pub mod pool;
pub mod producer;

pub use consumer::{ConsumerConfig, ConsumerWorker};
pub use pool::{WaitStatus, WorkerHandle, WorkerOutcome, WorkerPool};
pub use producer::{RandomDocsSpec, RandomProducer, TreeProducer};

use anyhow::Result;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::ImportStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    /// Finish queued work, then exit.
    StopGraceful = 1,
    /// Finish the in-flight unit only, then exit.
    StopForced = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Running,
            1 => WorkerState::StopGraceful,
            2 => WorkerState::StopForced,
            _ => WorkerState::Terminated,
        }
    }
}

/// Stop/terminate protocol common to producers and consumers.
pub trait Stoppable {
    /// Graceful stop: drain what is already queued, then exit.
    fn can_stop(&self);

    /// Forced stop: finish the in-flight unit, then exit.
    fn must_stop(&self);

    fn is_terminated(&self) -> bool;

    fn processed(&self) -> u64;
}

/// State and counters of one worker, shared between its thread and the orchestrator.
#[derive(Debug)]
pub struct WorkerControl {
    name: String,
    state: AtomicU8,
    processed: AtomicU64,
    snapshot: Mutex<ImportStats>,
}

impl WorkerControl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AtomicU8::new(WorkerState::Running as u8),
            processed: AtomicU64::new(0),
            snapshot: Mutex::new(ImportStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Any stop (graceful or forced) was requested, or the worker already exited.
    pub fn stop_requested(&self) -> bool {
        self.state() != WorkerState::Running
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.state(), WorkerState::StopForced | WorkerState::Terminated)
    }

    pub fn add_processed(&self, n: u64) {
        self.processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Publish the worker's current counters for the orchestrator.
    pub fn publish(&self, stats: &ImportStats) {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = *stats;
    }

    /// Last published counters. Complete once the worker is terminated.
    pub fn snapshot(&self) -> ImportStats {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn mark_terminated(&self) {
        self.state.store(WorkerState::Terminated as u8, Ordering::Release);
    }
}

impl Stoppable for WorkerControl {
    fn can_stop(&self) {
        // Only from Running: never downgrades a forced stop.
        let _ = self.state.compare_exchange(
            WorkerState::Running as u8,
            WorkerState::StopGraceful as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn must_stop(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s != WorkerState::Terminated as u8).then_some(WorkerState::StopForced as u8)
            });
    }

    fn is_terminated(&self) -> bool {
        self.state() == WorkerState::Terminated
    }

    fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

/// A unit of work run on its own pool thread.
pub trait Worker: Send + 'static {
    type Output: Send + 'static;

    /// Run until done or stopped. An `Err` is logged by the pool and treated as a forced stop.
    fn run(&mut self, control: &WorkerControl) -> Result<Self::Output>;
}
