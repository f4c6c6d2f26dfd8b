//! Direct mode: recursive traversal writing to the sink inline, forking subtrees onto a pool.

pub mod policy;
pub mod pool;
pub mod task;

pub use policy::{AlwaysFork, DefaultThreadingPolicy, ForkContext, NeverFork, ThreadingPolicy};
pub use pool::{TaskPool, TaskRecord, TaskRegistry, TaskState};
pub use task::{TaskContext, TraversalTask};

use anyhow::{Result, anyhow};
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use crate::error::ImportError;
use crate::pipeline::filter::{ImporterFilter, run_after, run_before};
use crate::pipeline::{ImportOutcome, StatsReport};
use crate::sink::{DocumentFactory, SinkFactory};
use crate::source::NodeBox;
use crate::{ImportStats, ImporterConfig};

pub struct DirectImporter {
    config: ImporterConfig,
    sinks: Arc<dyn SinkFactory>,
    policy: Arc<dyn ThreadingPolicy>,
    factory: DocumentFactory,
    filters: Vec<Box<dyn ImporterFilter>>,
    interrupt: Option<Arc<AtomicBool>>,
    registry: Arc<TaskRegistry>,
}

impl DirectImporter {
    pub fn new(config: ImporterConfig, sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            config,
            sinks,
            policy: Arc::new(DefaultThreadingPolicy::default()),
            factory: DocumentFactory::default(),
            filters: Vec::new(),
            interrupt: None,
            registry: Arc::new(TaskRegistry::new()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ThreadingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_factory(mut self, factory: DocumentFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn ImporterFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Tasks of the last run.
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Import `root` under the store path `target`.
    pub fn run(&mut self, root: NodeBox, target: &str) -> ImportOutcome {
        let started = Instant::now();
        self.registry = Arc::new(TaskRegistry::new());

        let error = match run_before(&mut self.filters) {
            Err(e) => Some(ImportError::PreImportHook(format!("{e:#}")).into()),
            Ok(()) => self.execute(root, target).err(),
        };
        run_after(&mut self.filters, error.as_ref());

        let stats: ImportStats = self.registry.totals();
        let report = StatsReport::direct(&stats, started.elapsed());
        report.log();
        ImportOutcome { report, error }
    }

    fn execute(&self, root: NodeBox, target: &str) -> Result<()> {
        let pool = TaskPool::new(self.config.threads, "direct-task")?;
        let spawner = pool
            .spawner()
            .ok_or_else(|| anyhow!("task pool closed before start"))?;
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(TaskContext {
            sinks: Arc::clone(&self.sinks),
            factory: self.factory.clone(),
            policy: Arc::clone(&self.policy),
            registry: Arc::clone(&self.registry),
            spawner,
            batch_size: self.config.batch_size,
            stop: Arc::clone(&stop),
        });
        info!("direct import with {} thread(s)", pool.threads());
        ctx.submit(root, target.to_string(), None);
        // The pool closes only once no task holds the context.
        drop(ctx);

        let mut interrupted = false;
        while !pool.is_idle() {
            if !interrupted && self.interrupt.as_ref().is_some_and(|f| f.load(Ordering::SeqCst)) {
                warn!("interrupted: stopping traversal tasks");
                stop.store(true, Ordering::SeqCst);
                interrupted = true;
            }
            thread::sleep(self.config.wait_interval);
        }
        pool.shutdown();

        if interrupted {
            return Err(ImportError::Interrupted.into());
        }
        let failed = self.registry.count_in(TaskState::Failed);
        if failed > 0 {
            return Err(ImportError::WorkersFailed { failed }.into());
        }
        info!("direct import finished: {} task(s)", self.registry.len());
        Ok(())
    }
}
