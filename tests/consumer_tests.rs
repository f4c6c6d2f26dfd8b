//! Consumer tests: batching, retry policy, permanent failures, graceful vs forced stop.

mod common;

use common::{RecordingFactory, records};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use treeload::ImportStats;
use treeload::queue::{OpenMode, QueueManager};
use treeload::worker::{
    ConsumerConfig, ConsumerWorker, Stoppable, Worker, WorkerControl, WorkerOutcome, WorkerPool,
};

fn config(batch_size: usize, retry_max: u32) -> ConsumerConfig {
    ConsumerConfig {
        batch_size,
        batch_threshold: Duration::from_secs(20),
        retry_max,
        retry_delay: Duration::from_millis(5),
        poll_timeout: Duration::from_millis(50),
    }
}

/// One-partition queue holding `n` records.
fn filled_queue(dir: &TempDir, n: usize) -> Arc<QueueManager> {
    let q = Arc::new(QueueManager::new(dir.path().join("queue"), 2));
    q.init(1, OpenMode::Reset).unwrap();
    for r in records(n, 4) {
        q.put(0, &r).unwrap();
    }
    q
}

/// Drain partition 0 on this thread with a graceful stop already requested.
fn drain_gracefully(
    q: &Arc<QueueManager>,
    sinks: &RecordingFactory,
    cfg: ConsumerConfig,
) -> ImportStats {
    let control = WorkerControl::new("test-consumer");
    control.can_stop();
    let mut worker = ConsumerWorker::new(0, Arc::clone(q), sinks.shared(), cfg);
    worker.run(&control).unwrap()
}

// --- batching ---

#[test]
fn test_drains_partition_in_full_batches() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 25);
    let sinks = RecordingFactory::new();
    let stats = drain_gracefully(&q, &sinks, config(10, 3));

    assert_eq!(stats.processed, 25);
    assert_eq!(stats.created, 25);
    assert_eq!(stats.errors, 0);
    let sizes: Vec<usize> = sinks.log.lock().unwrap().batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(q.is_empty(0).unwrap());
}

#[test]
fn test_batch_size_one_commits_every_record() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 7);
    let sinks = RecordingFactory::new();
    let stats = drain_gracefully(&q, &sinks, config(1, 0));
    assert_eq!(stats.created, 7);
    assert_eq!(sinks.commits(), 7);
}

#[test]
fn test_batch_threshold_flushes_partial_batch() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 3);
    let sinks = RecordingFactory::new();
    let mut cfg = config(100, 0);
    cfg.batch_threshold = Duration::from_millis(200);

    let mut pool: WorkerPool<ImportStats> = WorkerPool::new("consumer");
    pool.spawn(ConsumerWorker::new(0, Arc::clone(&q), sinks.shared(), cfg))
        .unwrap();
    thread::sleep(Duration::from_millis(1500));
    // No stop requested yet: only the time threshold can have closed the batch.
    assert_eq!(sinks.commits(), 1);
    assert_eq!(sinks.committed_count(), 3);

    pool.can_stop_all();
    pool.await_all(Duration::from_millis(20), None, None);
    assert!(pool.all_terminated());
}

// --- retries and failures ---

#[test]
fn test_transient_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 25);
    let sinks = RecordingFactory::new().with_transient_failures(1);
    let stats = drain_gracefully(&q, &sinks, config(10, 3));

    assert_eq!(stats.created, 25);
    assert_eq!(stats.errors, 0);
    assert_eq!(stats.retries, 1);
    assert_eq!(sinks.log.lock().unwrap().rollbacks, 1);
}

#[test]
fn test_exhausted_retries_count_batch_as_errors() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 20);
    // First batch: 3 failed attempts (retry_max 2). Second batch: 2 failures, then success.
    let sinks = RecordingFactory::new().with_transient_failures(5);
    let stats = drain_gracefully(&q, &sinks, config(10, 2));

    assert_eq!(stats.processed, 20);
    assert_eq!(stats.errors, 10);
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.created, 10);
    assert_eq!(stats.retries, 4);
}

#[test]
fn test_permanent_failure_drops_one_batch_only() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 30);
    let sinks = RecordingFactory::new().with_poison("rec-13");
    let stats = drain_gracefully(&q, &sinks, config(10, 3));

    assert_eq!(stats.errors, 10);
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.created, 20);
    assert_eq!(stats.retries, 0);
    assert!(!sinks.log.lock().unwrap().committed_names().contains(&"rec-13".to_string()));
}

// --- stop semantics ---

#[test]
fn test_forced_stop_finishes_current_batch_and_leaves_rest_unread() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 100);
    let control = Arc::new(WorkerControl::new("test-consumer"));
    let on_commit = Arc::clone(&control);
    let sinks = RecordingFactory::new().with_on_commit(move || on_commit.must_stop());

    let mut worker = ConsumerWorker::new(0, Arc::clone(&q), sinks.shared(), config(10, 3));
    let stats = worker.run(&control).unwrap();

    let unread = q.size(0).unwrap();
    assert_eq!(stats.created, 10);
    assert_eq!(unread, 90);
    assert_eq!(stats.created + stats.errors + unread, 100);
    assert_eq!(control.processed(), 10);
}

#[test]
fn test_forced_stop_accounting_with_failed_batch() {
    let dir = TempDir::new().unwrap();
    let q = filled_queue(&dir, 50);
    let control = Arc::new(WorkerControl::new("test-consumer"));
    let stopper = Arc::clone(&control);
    // Third batch is poisoned; the commit after it forces the stop.
    let sinks = RecordingFactory::new()
        .with_poison("rec-25")
        .with_on_commit(move || {
            if stopper.processed() >= 30 {
                stopper.must_stop();
            }
        });

    let mut worker = ConsumerWorker::new(0, Arc::clone(&q), sinks.shared(), config(10, 0));
    let stats = worker.run(&control).unwrap();
    let unread = q.size(0).unwrap();
    assert_eq!(stats.created + stats.errors + unread, 50);
    assert_eq!(stats.errors, 10);
}

#[test]
fn test_must_stop_is_not_downgraded_by_can_stop() {
    let control = WorkerControl::new("w");
    control.must_stop();
    control.can_stop();
    assert!(control.is_forced());
}

#[test]
fn test_pool_marks_failed_and_panicked_workers_terminated() {
    struct Failing(bool);
    impl Worker for Failing {
        type Output = ();
        fn run(&mut self, _control: &WorkerControl) -> anyhow::Result<()> {
            if self.0 {
                panic!("boom");
            }
            anyhow::bail!("cannot reach storage")
        }
    }

    let mut pool: WorkerPool<()> = WorkerPool::new("producer");
    pool.spawn(Failing(false)).unwrap();
    pool.spawn(Failing(true)).unwrap();
    pool.await_all(Duration::from_millis(10), None, None);
    let outcomes = pool.join();
    assert_eq!(outcomes.len(), 2);
    for (control, outcome) in outcomes {
        assert!(control.is_terminated());
        assert!(matches!(outcome, WorkerOutcome::Failed(_)));
    }
}
