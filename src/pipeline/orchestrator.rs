//! Queue-mode orchestration: producers → partitions → one consumer per partition → sink.

use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use super::filter::{ImporterFilter, run_after, run_before};
use super::report::StatsReport;
use crate::error::ImportError;
use crate::queue::{OpenMode, QueueManager};
use crate::sink::SinkFactory;
use crate::worker::consumer::BatchCallback;
use crate::worker::{
    ConsumerConfig, ConsumerWorker, WaitStatus, Worker, WorkerOutcome, WorkerPool,
};
use crate::{ImportStats, ImporterConfig};

/// Result of a run: the report is always present, the error only when the run failed.
#[derive(Debug)]
pub struct ImportOutcome {
    pub report: StatsReport,
    pub error: Option<anyhow::Error>,
}

impl ImportOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<StatsReport> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.report),
        }
    }
}

/// Counters gathered while the pipeline runs; reported even when it fails.
#[derive(Default)]
struct RunTally {
    produced: u64,
    resumed: u64,
    stats: ImportStats,
    timed_out: bool,
}

pub struct QueueImporter {
    config: ImporterConfig,
    queue: Arc<QueueManager>,
    sinks: Arc<dyn SinkFactory>,
    open_mode: OpenMode,
    filters: Vec<Box<dyn ImporterFilter>>,
    interrupt: Option<Arc<AtomicBool>>,
    on_batch: Option<BatchCallback>,
}

impl QueueImporter {
    pub fn new(
        config: ImporterConfig,
        queue: Arc<QueueManager>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        Self {
            config,
            queue,
            sinks,
            open_mode: OpenMode::Reset,
            filters: Vec::new(),
            interrupt: None,
            on_batch: None,
        }
    }

    pub fn with_open_mode(mut self, mode: OpenMode) -> Self {
        self.open_mode = mode;
        self
    }

    pub fn with_filter(mut self, filter: Box<dyn ImporterFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Flag raised by a signal handler; waits escalate to forced stop when it is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn with_batch_callback(mut self, cb: Option<BatchCallback>) -> Self {
        self.on_batch = cb;
        self
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    /// Run the import with `producers` feeding the queue. Filters see the run's error; the
    /// report is produced even on failure.
    pub fn run<P>(&mut self, producers: Vec<P>) -> ImportOutcome
    where
        P: Worker<Output = ()>,
    {
        let started = Instant::now();
        let mut tally = RunTally::default();

        let error = match run_before(&mut self.filters) {
            Err(e) => Some(ImportError::PreImportHook(format!("{e:#}")).into()),
            Ok(()) => self.execute(producers, &mut tally).err(),
        };
        run_after(&mut self.filters, error.as_ref());

        let report =
            StatsReport::new(tally.produced, tally.resumed, &tally.stats, started.elapsed())
                .with_timed_out(tally.timed_out);
        report.log();
        ImportOutcome { report, error }
    }

    fn execute<P>(&self, producers: Vec<P>, tally: &mut RunTally) -> Result<()>
    where
        P: Worker<Output = ()>,
    {
        self.queue.init(self.config.partitions, self.open_mode)?;
        let result = self
            .queue
            .total_size()
            .map_err(anyhow::Error::from)
            .and_then(|resumed| {
                tally.resumed = resumed;
                self.drive(producers, tally)
            });
        self.queue.close();
        result
    }

    fn drive<P>(&self, producers: Vec<P>, tally: &mut RunTally) -> Result<()>
    where
        P: Worker<Output = ()>,
    {
        let mut producer_pool: WorkerPool<()> = WorkerPool::new("producer");
        let mut consumer_pool: WorkerPool<ImportStats> = WorkerPool::new("consumer");
        let consumer_config = ConsumerConfig::from(&self.config);

        let spawned = producers
            .into_iter()
            .try_for_each(|p| producer_pool.spawn(p).map(|_| ()))
            .and_then(|()| {
                (0..self.queue.partition_count()).try_for_each(|partition| {
                    let worker = ConsumerWorker::new(
                        partition,
                        Arc::clone(&self.queue),
                        Arc::clone(&self.sinks),
                        consumer_config,
                    )
                    .with_batch_callback(self.on_batch.clone());
                    consumer_pool.spawn(worker).map(|_| ())
                })
            });
        if let Err(e) = spawned {
            producer_pool.must_stop_all();
            consumer_pool.must_stop_all();
            self.collect(producer_pool, consumer_pool, tally);
            return Err(e);
        }
        info!(
            "importing with {} producer(s) into {} partition(s)",
            producer_pool.len(),
            consumer_pool.len()
        );

        let interval = self.config.wait_interval;
        let interrupt = self.interrupt.as_deref();
        let producers_done =
            producer_pool.await_all(interval, self.config.producer_timeout, interrupt);
        debug!("producers finished ({:?})", producers_done);

        let consumers_done = if producers_done == WaitStatus::Interrupted {
            consumer_pool.must_stop_all();
            consumer_pool.await_all(interval, None, None)
        } else {
            // Only now: a graceful stop before the producers finish would truncate the import.
            consumer_pool.can_stop_all();
            consumer_pool.await_all(interval, self.config.drain_timeout, interrupt)
        };
        debug!("consumers finished ({:?})", consumers_done);

        tally.timed_out =
            producers_done == WaitStatus::TimedOut || consumers_done == WaitStatus::TimedOut;
        let failed = self.collect(producer_pool, consumer_pool, tally);
        if producers_done == WaitStatus::Interrupted || consumers_done == WaitStatus::Interrupted {
            return Err(ImportError::Interrupted.into());
        }
        if failed > 0 {
            return Err(ImportError::WorkersFailed { failed }.into());
        }
        Ok(())
    }

    /// Join both pools, merge per-worker snapshots into `tally`. Returns the failed worker count.
    fn collect(
        &self,
        producers: WorkerPool<()>,
        consumers: WorkerPool<ImportStats>,
        tally: &mut RunTally,
    ) -> usize {
        tally.produced = producers.processed();
        let mut failed = 0;
        for (_, outcome) in producers.join() {
            failed += usize::from(outcome.is_failed());
        }
        for (control, outcome) in consumers.join() {
            let stats = match outcome {
                WorkerOutcome::Finished(stats) => stats,
                WorkerOutcome::Failed(_) => {
                    failed += 1;
                    control.snapshot()
                }
            };
            tally.stats += stats;
        }
        failed
    }
}
