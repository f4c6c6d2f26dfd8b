//! One direct-mode traversal task: writes a subtree inline and offloads child subtrees.

use log::{debug, error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::policy::{ForkContext, ThreadingPolicy};
use super::pool::{TaskId, TaskRegistry, TaskSpawner, TaskState};
use crate::error::SinkResult;
use crate::sink::{DocId, DocumentFactory, RecordSink, SinkFactory};
use crate::source::{Children, NodeBox};
use crate::utils::config::ForkConsts;
use crate::{ImportStats, Record};

/// Everything tasks of one import share.
pub struct TaskContext {
    pub sinks: Arc<dyn SinkFactory>,
    pub factory: DocumentFactory,
    pub policy: Arc<dyn ThreadingPolicy>,
    pub registry: Arc<TaskRegistry>,
    pub spawner: TaskSpawner,
    pub batch_size: usize,
    /// Raised on interrupt: running tasks commit and exit, queued ones are cancelled.
    pub stop: Arc<AtomicBool>,
}

impl TaskContext {
    /// Register and submit a task creating `node` under `parent_path`.
    pub fn submit(self: &Arc<Self>, node: NodeBox, parent_path: String, parent: Option<TaskId>) {
        let id = self.registry.register(&parent_path, node.name(), parent);
        let task = TraversalTask {
            id,
            node,
            parent_path,
            is_root: parent.is_none(),
            ctx: Arc::clone(self),
        };
        self.spawner.submit(move || task.run());
    }
}

pub struct TraversalTask {
    id: TaskId,
    node: NodeBox,
    parent_path: String,
    is_root: bool,
    ctx: Arc<TaskContext>,
}

impl TraversalTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Run to completion on the current thread. Panics are contained and mark the task failed.
    pub fn run(self) {
        let registry = Arc::clone(&self.ctx.registry);
        let id = self.id;
        if self.ctx.stop.load(Ordering::SeqCst) {
            registry.set_state(id, TaskState::Cancelled);
            return;
        }
        registry.set_state(id, TaskState::Running);
        let state = match panic::catch_unwind(AssertUnwindSafe(|| self.execute())) {
            Ok(state) => state,
            Err(_) => {
                error!("traversal task {} panicked", id);
                TaskState::Failed
            }
        };
        registry.set_state(id, state);
    }

    fn execute(self) -> TaskState {
        let sink = match self.ctx.sinks.open() {
            Ok(s) => s,
            Err(e) => {
                error!("task {}: cannot open sink: {}", self.id, e);
                return TaskState::Failed;
            }
        };
        let mut w = TaskWriter {
            sink,
            id: self.id,
            registry: Arc::clone(&self.ctx.registry),
            batch_size: self.ctx.batch_size.max(1),
            in_batch: false,
            pending: 0,
            uploaded: 0,
            writes: 0,
            commits: 0,
            stats: ImportStats::default(),
        };
        let mut first_decision = self.is_root;
        let mut stack: Vec<(String, Children)> = Vec::new();

        if let Some(frame) = self.enter(&mut w, &self.parent_path, self.node.as_ref()) {
            stack.push(frame);
        }
        while let Some((parent, children)) = stack.last_mut() {
            if self.ctx.stop.load(Ordering::SeqCst) {
                debug!("task {} stopping early", self.id);
                break;
            }
            match children.next() {
                None => {
                    stack.pop();
                }
                Some(Err(e)) => warn!("unreadable entry under {}: {:#}", parent, e),
                Some(Ok(child)) => {
                    let parent = parent.clone();
                    if child.is_container() && self.should_fork(&w, &mut first_decision) {
                        w.commit();
                        self.ctx.submit(child, parent, Some(self.id));
                        continue;
                    }
                    if let Some(frame) = self.enter(&mut w, &parent, child.as_ref()) {
                        stack.push(frame);
                    }
                }
            }
        }
        w.commit();
        w.publish();
        TaskState::Done
    }

    /// The root task never forks on its first decision, so it always has work of its own.
    fn should_fork(&self, w: &TaskWriter, first_decision: &mut bool) -> bool {
        if std::mem::take(first_decision) {
            return false;
        }
        self.ctx.policy.need_to_fork(&ForkContext {
            uploaded: w.uploaded,
            batch_size: w.batch_size,
            backlog: self.ctx.spawner.backlog(),
        })
    }

    /// Write `node` under `parent`. Returns the frame to descend into for a created container.
    fn enter(
        &self,
        w: &mut TaskWriter,
        parent: &str,
        node: &dyn crate::source::SourceNode,
    ) -> Option<(String, Children)> {
        w.stats.processed += 1;
        let record = match self.ctx.factory.to_record(parent, node) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping {}/{}: {:#}", parent.trim_end_matches('/'), node.name(), e);
                w.stats.errors += 1;
                return None;
            }
        };
        let written = w.write(&record);
        if !node.is_container() {
            match written {
                Ok(_) => w.leaf_written(),
                Err(e) => {
                    warn!("cannot write {}: {}", record.path(), e);
                    w.stats.errors += 1;
                }
            }
            w.maybe_publish();
            return None;
        }
        let path = record.path();
        if let Err(e) = written {
            error!("cannot create container {}, subtree aborted: {}", path, e);
            w.stats.errors += 1;
            return None;
        }
        w.maybe_publish();
        match node.children() {
            Ok(children) => Some((path, children)),
            Err(e) => {
                warn!("cannot list {}, subtree skipped: {:#}", path, e);
                None
            }
        }
    }
}

/// A task's sink session plus its batch bookkeeping.
struct TaskWriter {
    sink: Box<dyn RecordSink>,
    id: TaskId,
    registry: Arc<TaskRegistry>,
    batch_size: usize,
    in_batch: bool,
    /// Writes in the open batch.
    pending: u64,
    /// Leaves written by this task; drives the commit cadence and the fork policy.
    uploaded: u64,
    writes: u64,
    commits: u64,
    stats: ImportStats,
}

impl TaskWriter {
    fn write(&mut self, record: &Record) -> SinkResult<DocId> {
        if !self.in_batch {
            self.sink.begin_batch()?;
            self.in_batch = true;
        }
        let id = self.sink.create_or_update(record)?;
        self.pending += 1;
        self.writes += 1;
        Ok(id)
    }

    fn leaf_written(&mut self) {
        self.uploaded += 1;
        if self.uploaded % self.batch_size as u64 == 0 {
            self.commit();
        }
    }

    /// Close the open batch, if any. A failed commit turns its writes into errors.
    fn commit(&mut self) {
        if !self.in_batch {
            return;
        }
        self.in_batch = false;
        match self.sink.commit_batch() {
            Ok(()) => {
                self.stats.created += self.pending;
                self.commits += 1;
            }
            Err(e) => {
                error!("task {}: commit of {} write(s) failed: {}", self.id, self.pending, e);
                if let Err(rb) = self.sink.rollback_batch() {
                    debug!("rollback after failed commit: {}", rb);
                }
                self.stats.errors += self.pending;
                self.stats.failed_batches += 1;
            }
        }
        self.pending = 0;
    }

    fn maybe_publish(&self) {
        if self.writes % ForkConsts::REGISTRY_PUBLISH_EVERY == 0 {
            self.publish();
        }
    }

    fn publish(&self) {
        self.registry.publish(self.id, &self.stats, self.commits);
    }
}
