//! When a traversal task hands a subtree to another thread.

use crate::utils::config::ForkConsts;

/// Inputs of one fork decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkContext {
    /// Leaves written so far by the asking task.
    pub uploaded: u64,
    pub batch_size: usize,
    /// Tasks submitted to the pool and not yet picked up by a thread.
    pub backlog: usize,
}

/// Decides whether the next child container becomes a new task. Must be a pure function of
/// its context.
pub trait ThreadingPolicy: Send + Sync {
    fn need_to_fork(&self, ctx: &ForkContext) -> bool;
}

/// Fork once the task has written a third of a batch, unless the pool backlog is already deep.
#[derive(Clone, Copy, Debug)]
pub struct DefaultThreadingPolicy {
    pub upload_divisor: u64,
    pub max_backlog: usize,
}

impl Default for DefaultThreadingPolicy {
    fn default() -> Self {
        Self {
            upload_divisor: ForkConsts::UPLOAD_DIVISOR,
            max_backlog: ForkConsts::MAX_BACKLOG,
        }
    }
}

impl ThreadingPolicy for DefaultThreadingPolicy {
    fn need_to_fork(&self, ctx: &ForkContext) -> bool {
        if ctx.uploaded < ctx.batch_size as u64 / self.upload_divisor.max(1) {
            return false;
        }
        ctx.backlog < self.max_backlog
    }
}

/// Single-threaded traversal: every subtree is visited by the task that found it.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverFork;

impl ThreadingPolicy for NeverFork {
    fn need_to_fork(&self, _ctx: &ForkContext) -> bool {
        false
    }
}

/// Fork every child container (maximal parallelism, bounded by the pool size).
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysFork;

impl ThreadingPolicy for AlwaysFork {
    fn need_to_fork(&self, _ctx: &ForkContext) -> bool {
        true
    }
}
