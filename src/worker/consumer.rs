//! Consumer: drains one partition into a sink in transactional batches.

use anyhow::{Context, Result};
use log::{debug, error, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{Worker, WorkerControl};
use crate::error::SinkResult;
use crate::queue::QueueManager;
use crate::sink::{RecordSink, SinkFactory};
use crate::{ImportStats, ImporterConfig, Record};

/// Called with the size of every applied batch (progress display).
pub type BatchCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// Batch and retry policy of one consumer.
#[derive(Clone, Copy, Debug)]
pub struct ConsumerConfig {
    pub batch_size: usize,
    pub batch_threshold: Duration,
    pub retry_max: u32,
    pub retry_delay: Duration,
    pub poll_timeout: Duration,
}

impl From<&ImporterConfig> for ConsumerConfig {
    fn from(c: &ImporterConfig) -> Self {
        Self {
            batch_size: c.batch_size.max(1),
            batch_threshold: c.batch_threshold,
            retry_max: c.retry_max,
            retry_delay: c.retry_delay,
            poll_timeout: c.poll_timeout,
        }
    }
}

pub struct ConsumerWorker {
    partition: usize,
    queue: Arc<QueueManager>,
    sinks: Arc<dyn SinkFactory>,
    config: ConsumerConfig,
    stats: ImportStats,
    on_batch: Option<BatchCallback>,
}

impl ConsumerWorker {
    pub fn new(
        partition: usize,
        queue: Arc<QueueManager>,
        sinks: Arc<dyn SinkFactory>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            partition,
            queue,
            sinks,
            config,
            stats: ImportStats::default(),
            on_batch: None,
        }
    }

    pub fn with_batch_callback(mut self, cb: Option<BatchCallback>) -> Self {
        self.on_batch = cb;
        self
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Poll until `batch_size` records are in hand, the batch threshold elapsed, or a stop cuts
    /// the fill short. Every polled record is counted as processed. A queue failure is returned
    /// alongside the records already in hand so they are still applied.
    fn fill(&mut self, control: &WorkerControl) -> (Vec<Record>, Option<anyhow::Error>) {
        let mut batch = Vec::with_capacity(self.config.batch_size);
        let mut first_at: Option<Instant> = None;
        while batch.len() < self.config.batch_size {
            if control.is_forced() {
                break;
            }
            let polled = self
                .queue
                .poll(self.partition, self.config.poll_timeout)
                .with_context(|| format!("poll partition {}", self.partition));
            match polled {
                Err(e) => return (batch, Some(e)),
                Ok(Some(record)) => {
                    control.add_processed(1);
                    self.stats.processed += 1;
                    first_at.get_or_insert_with(Instant::now);
                    batch.push(record);
                }
                // Nothing arrived within the poll timeout.
                Ok(None) => {
                    if batch.is_empty() || control.stop_requested() {
                        break;
                    }
                }
            }
            if first_at.is_some_and(|t| t.elapsed() >= self.config.batch_threshold) {
                break;
            }
        }
        (batch, None)
    }

    /// Apply `batch` as one transaction, retrying transient failures. Never fatal: an exhausted
    /// or permanent failure counts the batch as errors.
    fn apply(&mut self, sink: &mut dyn RecordSink, batch: &[Record]) {
        let mut attempt = 0u32;
        loop {
            match apply_once(sink, batch) {
                Ok(()) => {
                    self.stats.created += batch.len() as u64;
                    debug!(
                        "partition {}: committed {} record(s)",
                        self.partition,
                        batch.len()
                    );
                    return;
                }
                Err(e) if e.is_transient() && attempt < self.config.retry_max => {
                    attempt += 1;
                    self.stats.retries += 1;
                    warn!(
                        "partition {}: batch of {} failed ({}), retry {}/{} in {:?}",
                        self.partition,
                        batch.len(),
                        e,
                        attempt,
                        self.config.retry_max,
                        self.config.retry_delay
                    );
                    thread::sleep(self.config.retry_delay);
                }
                Err(e) => {
                    error!(
                        "partition {}: dropping batch of {} after {} attempt(s): {}",
                        self.partition,
                        batch.len(),
                        attempt + 1,
                        e
                    );
                    self.stats.errors += batch.len() as u64;
                    self.stats.failed_batches += 1;
                    return;
                }
            }
        }
    }
}

fn apply_once(sink: &mut dyn RecordSink, batch: &[Record]) -> SinkResult<()> {
    sink.begin_batch()?;
    let written = batch
        .iter()
        .try_for_each(|r| sink.create_or_update(r).map(|_| ()))
        .and_then(|()| sink.commit_batch());
    if let Err(e) = written {
        if let Err(rb) = sink.rollback_batch() {
            debug!("rollback after failed batch: {}", rb);
        }
        return Err(e);
    }
    Ok(())
}

impl Worker for ConsumerWorker {
    type Output = ImportStats;

    fn run(&mut self, control: &WorkerControl) -> Result<ImportStats> {
        let mut sink = self
            .sinks
            .open()
            .with_context(|| format!("open sink for partition {}", self.partition))?;
        loop {
            // Read before the fill: an empty fill after a graceful stop means the lane is drained.
            let graceful = control.stop_requested();
            let (batch, failure) = self.fill(control);
            if !batch.is_empty() {
                self.apply(sink.as_mut(), &batch);
                control.publish(&self.stats);
                if let Some(cb) = &self.on_batch {
                    cb(batch.len());
                }
            }
            if let Some(e) = failure {
                control.publish(&self.stats);
                return Err(e);
            }
            if control.is_forced() || (batch.is_empty() && graceful) {
                break;
            }
        }
        control.publish(&self.stats);
        debug!(
            "partition {} done: processed={} created={} errors={}",
            self.partition, self.stats.processed, self.stats.created, self.stats.errors
        );
        Ok(self.stats)
    }
}
