//! Named worker threads with per-thread failure isolation.

use anyhow::{Context, Result};
use log::{debug, error, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{Stoppable, Worker, WorkerControl};

/// How a worker thread ended.
#[derive(Debug)]
pub enum WorkerOutcome<T> {
    Finished(T),
    /// The worker returned an error or panicked; the message is already logged.
    Failed(String),
}

impl<T> WorkerOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, WorkerOutcome::Failed(_))
    }
}

/// How `await_all` returned. Workers are terminated in every case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    Completed,
    /// The deadline passed and the stragglers were force-stopped.
    TimedOut,
    /// The interrupt flag was raised and every worker was force-stopped.
    Interrupted,
}

pub struct WorkerHandle<T> {
    control: Arc<WorkerControl>,
    join: JoinHandle<WorkerOutcome<T>>,
}

impl<T> WorkerHandle<T> {
    pub fn control(&self) -> &Arc<WorkerControl> {
        &self.control
    }
}

impl<T> Stoppable for WorkerHandle<T> {
    fn can_stop(&self) {
        self.control.can_stop();
    }

    fn must_stop(&self) {
        self.control.must_stop();
    }

    fn is_terminated(&self) -> bool {
        self.control.is_terminated()
    }

    fn processed(&self) -> u64 {
        self.control.processed()
    }
}

/// Threads of one role (`producer`, `consumer`), named `import-<role>-<i>`.
pub struct WorkerPool<T> {
    role: &'static str,
    handles: Vec<WorkerHandle<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            handles: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[WorkerHandle<T>] {
        &self.handles
    }

    /// Start `worker` on a new named thread.
    pub fn spawn<W>(&mut self, mut worker: W) -> Result<Arc<WorkerControl>>
    where
        W: Worker<Output = T>,
    {
        let name = format!("import-{}-{}", self.role, self.handles.len());
        let control = Arc::new(WorkerControl::new(name.clone()));
        let ctl = Arc::clone(&control);
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&ctl)));
                let outcome = match result {
                    Ok(Ok(out)) => WorkerOutcome::Finished(out),
                    Ok(Err(e)) => {
                        error!("{} failed: {:#}", ctl.name(), e);
                        ctl.must_stop();
                        WorkerOutcome::Failed(format!("{e:#}"))
                    }
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        error!("{} panicked: {}", ctl.name(), msg);
                        ctl.must_stop();
                        WorkerOutcome::Failed(msg)
                    }
                };
                ctl.mark_terminated();
                outcome
            })
            .with_context(|| format!("spawn thread {name}"))?;
        debug!("started {}", name);
        self.handles.push(WorkerHandle {
            control: Arc::clone(&control),
            join,
        });
        Ok(control)
    }

    pub fn can_stop_all(&self) {
        self.handles.iter().for_each(Stoppable::can_stop);
    }

    pub fn must_stop_all(&self) {
        self.handles.iter().for_each(Stoppable::must_stop);
    }

    pub fn all_terminated(&self) -> bool {
        self.handles.iter().all(Stoppable::is_terminated)
    }

    /// Sum of processed counters.
    pub fn processed(&self) -> u64 {
        self.handles.iter().map(Stoppable::processed).sum()
    }

    /// Sleep-poll every `interval` until all workers terminated.
    ///
    /// When `interrupt` is raised, every worker is force-stopped; when `deadline` passes, the
    /// remaining ones are. Either way the wait continues until they have exited.
    pub fn await_all(
        &self,
        interval: Duration,
        deadline: Option<Duration>,
        interrupt: Option<&AtomicBool>,
    ) -> WaitStatus {
        let started = Instant::now();
        let mut status = WaitStatus::Completed;
        while !self.all_terminated() {
            if status != WaitStatus::Interrupted
                && interrupt.is_some_and(|f| f.load(Ordering::SeqCst))
            {
                warn!("interrupted: forcing {} {}(s) to stop", self.len(), self.role);
                self.must_stop_all();
                status = WaitStatus::Interrupted;
            }
            if status == WaitStatus::Completed
                && deadline.is_some_and(|d| started.elapsed() >= d)
            {
                let pending = self.handles.iter().filter(|h| !h.is_terminated()).count();
                warn!(
                    "{} {}(s) still running after {:?}; forcing stop",
                    pending, self.role, started.elapsed()
                );
                self.must_stop_all();
                status = WaitStatus::TimedOut;
            }
            thread::sleep(interval);
        }
        status
    }

    /// Join every thread. Returns each worker's outcome with its control, in spawn order.
    pub fn join(self) -> Vec<(Arc<WorkerControl>, WorkerOutcome<T>)> {
        self.handles
            .into_iter()
            .map(|h| {
                let outcome = h.join.join().unwrap_or_else(|payload| {
                    WorkerOutcome::Failed(panic_message(payload.as_ref()))
                });
                (h.control, outcome)
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
