//! Queue-mode orchestration tests: accounting, fault isolation, hooks, interrupt, resume.

mod common;

use common::{RecordingFactory, record, records};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use treeload::error::ImportError;
use treeload::pipeline::ImporterFilter;
use treeload::queue::{OpenMode, QueueManager};
use treeload::source::MemoryNode;
use treeload::worker::{
    RandomDocsSpec, RandomProducer, Stoppable, TreeProducer, Worker, WorkerControl,
};
use treeload::{ImportOutcome, ImporterConfig, QueueImporter, Record};

#[derive(Clone, Copy)]
enum Behavior {
    Normal,
    Fail,
    Panic,
}

/// Dispatches a fixed list of records, optionally slowly, or fails outright.
struct ListProducer {
    records: Vec<Record>,
    queue: Arc<QueueManager>,
    behavior: Behavior,
    delay: Duration,
}

impl ListProducer {
    fn new(records: Vec<Record>, queue: &Arc<QueueManager>) -> Self {
        Self {
            records,
            queue: Arc::clone(queue),
            behavior: Behavior::Normal,
            delay: Duration::ZERO,
        }
    }

    fn behaving(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Worker for ListProducer {
    type Output = ();

    fn run(&mut self, control: &WorkerControl) -> anyhow::Result<()> {
        match self.behavior {
            Behavior::Fail => anyhow::bail!("source unreachable"),
            Behavior::Panic => panic!("producer bug"),
            Behavior::Normal => {}
        }
        for r in &self.records {
            if control.is_forced() {
                return Ok(());
            }
            self.queue.dispatch(r)?;
            control.add_processed(1);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }
        Ok(())
    }
}

fn config(partitions: usize, batch_size: usize) -> ImporterConfig {
    let mut c = ImporterConfig::default();
    c.partitions = partitions;
    c.batch_size = batch_size;
    c.batch_threshold = Duration::from_secs(5);
    c.retry_max = 3;
    c.retry_delay = Duration::from_millis(5);
    c.poll_timeout = Duration::from_millis(50);
    c.wait_interval = Duration::from_millis(10);
    c
}

/// Queue with key depth 3: every `records()` path is its own key.
fn queue(dir: &TempDir) -> Arc<QueueManager> {
    Arc::new(QueueManager::new(dir.path().join("queue"), 3))
}

fn import_error(outcome: &ImportOutcome) -> &ImportError {
    outcome
        .error
        .as_ref()
        .and_then(|e| e.downcast_ref::<ImportError>())
        .expect("run should fail with an ImportError")
}

/// Filter that records what it saw.
#[derive(Clone, Default)]
struct SpyFilter {
    calls: Arc<Mutex<Vec<String>>>,
    fail_before: bool,
    fail_after: bool,
}

impl ImporterFilter for SpyFilter {
    fn before_import(&mut self) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push("before".into());
        if self.fail_before {
            anyhow::bail!("store is read-only");
        }
        Ok(())
    }

    fn after_import(&mut self, error: Option<&anyhow::Error>) -> anyhow::Result<()> {
        let seen = match error {
            Some(_) => "after:error",
            None => "after:ok",
        };
        self.calls.lock().unwrap().push(seen.into());
        if self.fail_after {
            anyhow::bail!("cleanup failed");
        }
        Ok(())
    }
}

// --- accounting ---

#[test]
fn test_every_record_is_created_once_with_transient_failures() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let sinks = RecordingFactory::new().with_transient_failures(1);
    let all = records(2000, 50);
    let producers = vec![
        ListProducer::new(all[..1000].to_vec(), &q),
        ListProducer::new(all[1000..].to_vec(), &q),
    ];

    let mut importer = QueueImporter::new(config(4, 10), Arc::clone(&q), sinks.shared());
    let outcome = importer.run(producers);

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    let report = &outcome.report;
    assert_eq!(report.produced, 2000);
    assert_eq!(report.consumed, 2000);
    assert_eq!(report.created, 2000);
    assert_eq!(report.errors, 0);
    assert_eq!(report.retries, 4);
    assert!(report.consistent);

    let mut names = sinks.log.lock().unwrap().committed_names();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 2000);
    assert!(!q.is_initialized());
}

#[test]
fn test_poisoned_record_fails_its_batch_but_not_the_run() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let sinks = RecordingFactory::new().with_poison("rec-7");
    let producers = vec![ListProducer::new(records(100, 5), &q)];

    let outcome = QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared()).run(producers);

    assert!(outcome.is_ok());
    let report = outcome.report;
    assert_eq!(report.failed_batches, 1);
    assert!(report.errors >= 1);
    assert_eq!(report.created + report.errors, 100);
    assert!(report.consistent);
}

#[test]
fn test_tree_producer_keeps_parents_before_children() {
    let dir = TempDir::new().unwrap();
    let q = Arc::new(QueueManager::new(dir.path().join("queue"), 2));
    let sinks = RecordingFactory::new();
    let tree = MemoryNode::folder(
        "root",
        vec![
            MemoryNode::folder(
                "a",
                vec![
                    MemoryNode::document("a1.txt", "one"),
                    MemoryNode::folder("deep", vec![MemoryNode::leaf("x")]),
                ],
            ),
            MemoryNode::folder("b", vec![MemoryNode::document("b1.txt", "two")]),
        ],
    );
    let total = tree.count() as u64;
    let producer = TreeProducer::new(Box::new(tree), "/", Arc::clone(&q));

    let outcome =
        QueueImporter::new(config(3, 2), Arc::clone(&q), sinks.shared()).run(vec![producer]);

    assert!(outcome.is_ok());
    assert_eq!(outcome.report.created, total);
    let log = sinks.log.lock().unwrap();
    let paths: Vec<String> = log.committed().iter().map(|r| r.path()).collect();
    let pos = |p: &str| paths.iter().position(|x| x == p).unwrap();
    assert!(pos("/root/a") < pos("/root/a/a1.txt"));
    assert!(pos("/root/a/deep") < pos("/root/a/deep/x"));
    assert!(pos("/root/b") < pos("/root/b/b1.txt"));
}

#[test]
fn test_random_producers_split_folders_without_overlap() {
    let dir = TempDir::new().unwrap();
    let q = Arc::new(QueueManager::new(dir.path().join("queue"), 1));
    let sinks = RecordingFactory::new();
    let spec = RandomDocsSpec {
        target: "/".into(),
        documents: 95,
        folder_size: 10,
        avg_blob_size: 64,
        seed: 7,
    };
    let expected = spec.record_count() as u64;
    let producers = RandomProducer::split(spec, 3, &q);
    assert_eq!(producers.len(), 3);

    let outcome = QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared()).run(producers);

    assert!(outcome.is_ok());
    assert_eq!(outcome.report.produced, expected);
    assert_eq!(outcome.report.created, expected);
    let log = sinks.log.lock().unwrap();
    let folders = log.committed().iter().filter(|r| r.doc_type == "Folder").count();
    assert_eq!(folders, 10);
}

// --- fault isolation ---

#[test]
fn test_failing_producer_is_isolated() {
    for bad in [Behavior::Fail, Behavior::Panic] {
        let dir = TempDir::new().unwrap();
        let q = queue(&dir);
        let sinks = RecordingFactory::new();
        let producers = vec![
            ListProducer::new(records(50, 5), &q),
            ListProducer::new(Vec::new(), &q).behaving(bad),
        ];

        let outcome =
            QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared()).run(producers);

        assert!(matches!(
            import_error(&outcome),
            ImportError::WorkersFailed { failed: 1 }
        ));
        assert_eq!(outcome.report.created, 50);
        assert!(outcome.report.consistent);
    }
}

#[test]
fn test_failing_sink_factory_fails_consumers_only() {
    struct Unavailable;
    impl treeload::sink::SinkFactory for Unavailable {
        fn open(&self) -> treeload::error::SinkResult<Box<dyn treeload::sink::RecordSink>> {
            Err(treeload::error::SinkError::Transient("connection refused".into()))
        }
    }

    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let producers = vec![ListProducer::new(records(20, 2), &q)];
    let outcome =
        QueueImporter::new(config(2, 10), Arc::clone(&q), Arc::new(Unavailable)).run(producers);

    assert!(matches!(
        import_error(&outcome),
        ImportError::WorkersFailed { failed: 2 }
    ));
    assert_eq!(outcome.report.produced, 20);
    assert_eq!(outcome.report.created, 0);
    assert!(!outcome.report.consistent);
}

// --- hooks ---

#[test]
fn test_pre_import_failure_skips_run_but_runs_post_hook() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let sinks = RecordingFactory::new();
    let spy = SpyFilter {
        fail_before: true,
        ..Default::default()
    };
    let calls = Arc::clone(&spy.calls);

    let outcome = QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared())
        .with_filter(Box::new(spy))
        .run(vec![ListProducer::new(records(10, 1), &q)]);

    assert!(matches!(import_error(&outcome), ImportError::PreImportHook(_)));
    assert_eq!(*calls.lock().unwrap(), vec!["before", "after:error"]);
    assert_eq!(outcome.report.produced, 0);
    assert_eq!(sinks.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_post_import_failure_does_not_change_result() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let sinks = RecordingFactory::new();
    let spy = SpyFilter {
        fail_after: true,
        ..Default::default()
    };
    let calls = Arc::clone(&spy.calls);

    let outcome = QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared())
        .with_filter(Box::new(spy))
        .run(vec![ListProducer::new(records(10, 1), &q)]);

    assert!(outcome.is_ok());
    assert_eq!(outcome.report.created, 10);
    assert_eq!(*calls.lock().unwrap(), vec!["before", "after:ok"]);
}

// --- interrupt and resume ---

#[test]
fn test_interrupt_forces_stop_and_keeps_accounting() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let sinks = RecordingFactory::new();
    let flag = Arc::new(AtomicBool::new(false));
    let raiser = {
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            flag.store(true, Ordering::SeqCst);
        })
    };
    let producers = vec![ListProducer::new(records(5000, 20), &q).slow(Duration::from_millis(1))];

    let outcome = QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared())
        .with_interrupt(Arc::clone(&flag))
        .run(producers);
    raiser.join().unwrap();

    assert!(matches!(import_error(&outcome), ImportError::Interrupted));
    let report = outcome.report;
    assert!(report.produced < 5000);
    assert_eq!(report.created + report.errors, report.consumed);

    // What was dispatched but not consumed is still on disk.
    let reopened = QueueManager::new(dir.path().join("queue"), 3);
    reopened.init(2, OpenMode::Resume).unwrap();
    assert_eq!(report.consumed + reopened.total_size().unwrap(), report.produced);
}

#[test]
fn test_drain_deadline_forces_consumers_to_stop() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    let sinks = RecordingFactory::new().with_on_commit(|| thread::sleep(Duration::from_millis(50)));
    let mut cfg = config(1, 5);
    cfg.drain_timeout = Some(Duration::from_millis(200));
    let producers = vec![ListProducer::new(records(400, 4), &q)];

    let started = std::time::Instant::now();
    let outcome = QueueImporter::new(cfg, Arc::clone(&q), sinks.shared()).run(producers);

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(outcome.is_ok(), "{:?}", outcome.error);
    let report = outcome.report;
    assert_eq!(report.produced, 400);
    assert!(report.timed_out);
    assert!(!report.consistent);
    assert!(report.consumed < 400);
    assert_eq!(report.created, report.consumed);

    // Unread records stay queued for a resumed run.
    let reopened = QueueManager::new(dir.path().join("queue"), 3);
    reopened.init(1, OpenMode::Resume).unwrap();
    assert_eq!(report.created + reopened.total_size().unwrap(), report.produced);
}

#[test]
fn test_resume_drains_records_left_by_previous_run() {
    let dir = TempDir::new().unwrap();
    let q = queue(&dir);
    q.init(2, OpenMode::Reset).unwrap();
    for r in records(30, 3) {
        q.dispatch(&r).unwrap();
    }
    q.close();

    let sinks = RecordingFactory::new();
    let outcome = QueueImporter::new(config(2, 10), Arc::clone(&q), sinks.shared())
        .with_open_mode(OpenMode::Resume)
        .run(vec![ListProducer::new(vec![record("/import", "fresh")], &q)]);

    assert!(outcome.is_ok());
    let report = outcome.report;
    assert_eq!(report.resumed, 30);
    assert_eq!(report.produced, 1);
    assert_eq!(report.consumed, 31);
    assert_eq!(report.created, 31);
    assert!(report.consistent);
}

#[test]
fn test_stop_requests_are_idempotent_on_controls() {
    let control = WorkerControl::new("p");
    control.can_stop();
    control.can_stop();
    assert!(control.stop_requested());
    assert!(!control.is_forced());
    control.must_stop();
    assert!(control.is_forced());
}
