//! Fixed-size task pool and the registry of direct-mode tasks.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::ImportStats;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable handle for submitting tasks, usable from inside running tasks.
#[derive(Clone)]
pub struct TaskSpawner {
    tx: Sender<Job>,
    backlog: Receiver<Job>,
    pending: Arc<AtomicUsize>,
}

impl TaskSpawner {
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Box::new(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            error!("task pool is shut down; task dropped");
        }
    }

    /// Tasks waiting for a thread.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Tasks submitted and not yet finished (queued or running).
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// `n` threads named `<prefix>-<i>` draining one unbounded channel.
pub struct TaskPool {
    spawner: Option<TaskSpawner>,
    threads: Vec<JoinHandle<()>>,
}

impl TaskPool {
    pub fn new(n: usize, prefix: &str) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let threads = (0..n.max(1))
            .map(|i| {
                let rx = rx.clone();
                let pending = Arc::clone(&pending);
                thread::Builder::new()
                    .name(format!("{prefix}-{i}"))
                    .spawn(move || {
                        while let Ok(job) = rx.recv() {
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!("task panicked outside its own handler");
                            }
                            pending.fetch_sub(1, Ordering::SeqCst);
                        }
                    })
                    .with_context(|| format!("spawn {prefix}-{i}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            spawner: Some(TaskSpawner {
                tx,
                backlog: rx,
                pending,
            }),
            threads,
        })
    }

    pub fn spawner(&self) -> Option<TaskSpawner> {
        self.spawner.clone()
    }

    pub fn is_idle(&self) -> bool {
        self.spawner.as_ref().is_none_or(|s| s.pending() == 0)
    }

    pub fn threads(&self) -> usize {
        self.threads.len()
    }

    /// Close the channel and join the threads. Queued tasks still run; call once idle.
    pub fn shutdown(mut self) {
        self.spawner = None;
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
    }
}

pub type TaskId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Done,
    /// Skipped because the import was stopped before it started.
    Cancelled,
    Failed,
}

/// One registry entry.
#[derive(Clone, Debug)]
pub struct TaskRecord {
    /// Store path of the subtree's parent.
    pub parent_path: String,
    pub name: String,
    pub parent_task: Option<TaskId>,
    pub state: TaskState,
    pub stats: ImportStats,
    pub commits: u64,
}

/// Index-addressed record of every task of one direct import, owned by its importer.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<Vec<TaskRecord>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TaskRecord>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, parent_path: &str, name: &str, parent_task: Option<TaskId>) -> TaskId {
        let mut tasks = self.lock();
        tasks.push(TaskRecord {
            parent_path: parent_path.to_string(),
            name: name.to_string(),
            parent_task,
            state: TaskState::Queued,
            stats: ImportStats::default(),
            commits: 0,
        });
        tasks.len() - 1
    }

    pub fn set_state(&self, id: TaskId, state: TaskState) {
        if let Some(t) = self.lock().get_mut(id) {
            t.state = state;
        }
    }

    /// Replace a task's counters with its latest values.
    pub fn publish(&self, id: TaskId, stats: &ImportStats, commits: u64) {
        if let Some(t) = self.lock().get_mut(id) {
            t.stats = *stats;
            t.commits = commits;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.lock().get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.lock().clone()
    }

    /// Merged counters of all tasks.
    pub fn totals(&self) -> ImportStats {
        self.lock().iter().map(|t| &t.stats).sum()
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.lock().iter().filter(|t| t.state == state).count()
    }
}
