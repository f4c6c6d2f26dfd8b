//! Direct-mode tests: commit cadence, fork policy, failure containment, synthetic trees.

mod common;

use common::RecordingFactory;
use std::sync::Arc;
use std::time::Duration;
use treeload::error::{ImportError, SinkError, SinkResult};
use treeload::sink::{RecordSink, SinkFactory};
use treeload::source::{MemoryNode, RandomNode, RandomTreeSpec};
use treeload::traversal::{
    AlwaysFork, DefaultThreadingPolicy, ForkContext, NeverFork, TaskState, ThreadingPolicy,
};
use treeload::{DirectImporter, ImporterConfig};

fn config(threads: usize, batch_size: usize) -> ImporterConfig {
    let mut c = ImporterConfig::default();
    c.threads = threads;
    c.batch_size = batch_size;
    c.wait_interval = Duration::from_millis(5);
    c
}

fn leaves(prefix: &str, n: usize) -> Vec<MemoryNode> {
    (0..n)
        .map(|i| MemoryNode::document(format!("{prefix}-{i}.txt"), format!("body {i}")))
        .collect()
}

/// `levels` nested folders, each holding `per_level` leaves followed by the next folder.
fn chain(levels: usize, per_level: usize) -> MemoryNode {
    let mut node = MemoryNode::folder(format!("level{levels}"), leaves("leaf", per_level));
    for l in (1..levels).rev() {
        let mut children = leaves("leaf", per_level);
        children.push(node);
        node = MemoryNode::folder(format!("level{l}"), children);
    }
    node
}

fn files_per_commit(sinks: &RecordingFactory) -> Vec<usize> {
    sinks
        .log
        .lock()
        .unwrap()
        .batches
        .iter()
        .map(|b| b.iter().filter(|r| r.doc_type == "File").count())
        .collect()
}

// --- commit cadence ---

#[test]
fn test_single_task_commits_every_batch_of_leaves() {
    let sinks = RecordingFactory::new();
    let tree = chain(5, 20);
    let mut importer =
        DirectImporter::new(config(2, 10), sinks.shared()).with_policy(Arc::new(NeverFork));
    let outcome = importer.run(Box::new(tree), "/");

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(files_per_commit(&sinks), vec![10; 10]);
    assert_eq!(importer.registry().len(), 1);
    assert_eq!(outcome.report.created, 105);
    assert_eq!(outcome.report.consumed, 105);
    assert!(outcome.report.consistent);

    let task = importer.registry().get(0).unwrap();
    assert_eq!(task.state, TaskState::Done);
    assert_eq!(task.commits, 10);
}

#[test]
fn test_final_partial_batch_is_committed() {
    let sinks = RecordingFactory::new();
    let tree = MemoryNode::folder("root", leaves("doc", 95));
    let outcome = DirectImporter::new(config(1, 10), sinks.shared())
        .with_policy(Arc::new(NeverFork))
        .run(Box::new(tree), "/");

    assert!(outcome.is_ok());
    let sizes = files_per_commit(&sinks);
    assert_eq!(sizes.len(), 10);
    assert_eq!(sizes[9], 5);
    assert_eq!(outcome.report.created, 96);
}

#[test]
fn test_batch_size_one_commits_each_leaf() {
    let sinks = RecordingFactory::new();
    let tree = MemoryNode::folder("root", leaves("doc", 4));
    let outcome = DirectImporter::new(config(1, 1), sinks.shared())
        .with_policy(Arc::new(NeverFork))
        .run(Box::new(tree), "/");

    assert!(outcome.is_ok());
    assert_eq!(files_per_commit(&sinks), vec![1, 1, 1, 1]);
}

#[test]
fn test_leaves_without_payload_are_plain_records() {
    let sinks = RecordingFactory::new();
    let tree = MemoryNode::folder(
        "root",
        vec![MemoryNode::leaf("note-a"), MemoryNode::leaf("note-b")],
    );
    let outcome = DirectImporter::new(config(1, 10), sinks.shared())
        .with_policy(Arc::new(NeverFork))
        .run(Box::new(tree), "/");

    assert!(outcome.is_ok(), "{:?}", outcome.error);
    assert_eq!(outcome.report.errors, 0);
    assert_eq!(outcome.report.created, 3);

    let log = sinks.log.lock().unwrap();
    let leaves: Vec<_> = log.committed().into_iter().filter(|r| r.name != "root").collect();
    assert_eq!(leaves.len(), 2);
    assert!(leaves.iter().all(|r| r.payload.is_none()));
}

// --- forking ---

#[test]
fn test_always_fork_gives_each_subfolder_but_the_first_its_own_task() {
    let sinks = RecordingFactory::new();
    let subfolders = (0..6)
        .map(|i| MemoryNode::folder(format!("sub{i}"), leaves(&format!("s{i}"), 3)))
        .collect();
    let tree = MemoryNode::folder("root", subfolders);
    let mut importer =
        DirectImporter::new(config(3, 10), sinks.shared()).with_policy(Arc::new(AlwaysFork));
    let outcome = importer.run(Box::new(tree), "/");

    assert!(outcome.is_ok());
    let registry = importer.registry();
    assert_eq!(registry.len(), 6);
    assert_eq!(registry.count_in(TaskState::Done), 6);
    assert_eq!(outcome.report.created, 25);

    let tasks = registry.snapshot();
    assert_eq!(tasks[0].parent_task, None);
    for t in &tasks[1..] {
        assert_eq!(t.parent_task, Some(0));
        assert_eq!(t.parent_path, "/root");
        assert_eq!(t.stats.created, 4);
    }

    let mut paths: Vec<String> = sinks
        .log
        .lock()
        .unwrap()
        .committed()
        .iter()
        .map(|r| r.path())
        .collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 25);
    assert!(paths.contains(&"/root/sub5/s5-2.txt".to_string()));
}

#[test]
fn test_default_policy_waits_for_a_third_of_a_batch() {
    let policy = DefaultThreadingPolicy::default();
    let ctx = |uploaded, backlog| ForkContext {
        uploaded,
        batch_size: 30,
        backlog,
    };
    assert!(!policy.need_to_fork(&ctx(0, 0)));
    assert!(!policy.need_to_fork(&ctx(9, 0)));
    assert!(policy.need_to_fork(&ctx(10, 0)));
    assert!(policy.need_to_fork(&ctx(500, 4)));
    assert!(!policy.need_to_fork(&ctx(500, 5)));
    // Same inputs, same answer.
    assert_eq!(policy.need_to_fork(&ctx(12, 1)), policy.need_to_fork(&ctx(12, 1)));
}

#[test]
fn test_default_policy_spreads_wide_tree_over_tasks() {
    let sinks = RecordingFactory::new();
    let mut children = leaves("top", 40);
    children.extend(
        (0..8).map(|i| MemoryNode::folder(format!("sub{i}"), leaves(&format!("s{i}"), 30))),
    );
    let tree = MemoryNode::folder("root", children);
    let mut importer = DirectImporter::new(config(4, 30), sinks.shared());
    let outcome = importer.run(Box::new(tree), "/");

    assert!(outcome.is_ok());
    assert!(importer.registry().len() > 1);
    assert_eq!(outcome.report.created, 1 + 40 + 8 + 8 * 30);
}

// --- failures ---

#[test]
fn test_failed_container_skips_its_subtree_only() {
    let sinks = RecordingFactory::new().with_poison("broken");
    let tree = MemoryNode::folder(
        "root",
        vec![
            MemoryNode::document("a.txt", "a"),
            MemoryNode::folder("broken", leaves("lost", 2)),
            MemoryNode::document("b.txt", "b"),
        ],
    );
    let outcome = DirectImporter::new(config(1, 10), sinks.shared())
        .with_policy(Arc::new(NeverFork))
        .run(Box::new(tree), "/");

    assert!(outcome.is_ok());
    assert_eq!(outcome.report.errors, 1);
    assert_eq!(outcome.report.created, 3);
    assert_eq!(outcome.report.consumed, 4);
    let names = sinks.log.lock().unwrap().committed_names();
    assert!(names.contains(&"b.txt".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("lost")));
}

#[test]
fn test_failed_leaf_does_not_stop_traversal() {
    let sinks = RecordingFactory::new().with_poison("doc-2.txt");
    let tree = MemoryNode::folder("root", leaves("doc", 5));
    let outcome = DirectImporter::new(config(1, 10), sinks.shared())
        .with_policy(Arc::new(NeverFork))
        .run(Box::new(tree), "/");

    assert!(outcome.is_ok());
    assert_eq!(outcome.report.errors, 1);
    assert_eq!(outcome.report.created, 5);
}

#[test]
fn test_failed_commit_counts_pending_writes_as_errors() {
    let sinks = RecordingFactory::new().with_transient_failures(1);
    let tree = MemoryNode::folder("root", leaves("doc", 20));
    let outcome = DirectImporter::new(config(1, 10), sinks.shared())
        .with_policy(Arc::new(NeverFork))
        .run(Box::new(tree), "/");

    let report = outcome.report;
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.errors, 11);
    assert_eq!(report.created, 10);
}

#[test]
fn test_unavailable_sink_fails_the_task() {
    struct Unavailable;
    impl SinkFactory for Unavailable {
        fn open(&self) -> SinkResult<Box<dyn RecordSink>> {
            Err(SinkError::Permanent("no such store".into()))
        }
    }

    let mut importer = DirectImporter::new(config(1, 10), Arc::new(Unavailable));
    let outcome = importer.run(Box::new(MemoryNode::folder("root", leaves("d", 3))), "/");

    let err = outcome.error.as_ref().and_then(|e| e.downcast_ref::<ImportError>());
    assert!(matches!(err, Some(ImportError::WorkersFailed { failed: 1 })));
    assert_eq!(importer.registry().count_in(TaskState::Failed), 1);
}

// --- synthetic trees ---

#[test]
fn test_random_tree_is_deterministic_and_sized() {
    let spec = RandomTreeSpec {
        depth: 2,
        folders: 3,
        documents: 4,
        avg_blob_size: 32,
        seed: 42,
    };
    assert_eq!(spec.document_count(), 16);

    let mut runs = Vec::new();
    for _ in 0..2 {
        let sinks = RecordingFactory::new();
        let outcome = DirectImporter::new(config(1, 10), sinks.shared())
            .with_policy(Arc::new(NeverFork))
            .run(Box::new(RandomNode::root(spec.clone())), "/");
        assert!(outcome.is_ok());

        let log = sinks.log.lock().unwrap();
        let files = log.committed().iter().filter(|r| r.doc_type == "File").count();
        let folders = log.committed().iter().filter(|r| r.doc_type == "Folder").count();
        assert_eq!(files, 16);
        assert_eq!(folders, 4);
        runs.push(
            log.committed()
                .iter()
                .map(|r| (r.path(), r.payload.clone()))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(runs[0], runs[1]);
}
