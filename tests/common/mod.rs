//! Shared fixtures: an in-memory recording sink with injectable faults, record builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use treeload::error::{SinkError, SinkResult};
use treeload::sink::{DocId, RecordSink, SinkFactory};
use treeload::{Properties, PropertyValue, Record};

/// What every sink of one factory committed, in commit order.
#[derive(Debug, Default)]
pub struct SinkLog {
    pub batches: Vec<Vec<Record>>,
    pub rollbacks: usize,
}

impl SinkLog {
    pub fn committed(&self) -> Vec<&Record> {
        self.batches.iter().flatten().collect()
    }

    pub fn committed_names(&self) -> Vec<String> {
        self.committed().iter().map(|r| r.name.clone()).collect()
    }
}

/// Factory of [`RecordingSink`]s sharing one log.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub log: Arc<Mutex<SinkLog>>,
    /// Transient commit failures each new sink starts with.
    pub transient_per_sink: u32,
    /// Records with this name fail permanently.
    pub poison_name: Option<String>,
    /// Called after every successful commit.
    pub on_commit: Option<Arc<dyn Fn() + Send + Sync>>,
    pub opened: Arc<AtomicUsize>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transient_failures(mut self, n: u32) -> Self {
        self.transient_per_sink = n;
        self
    }

    pub fn with_poison(mut self, name: &str) -> Self {
        self.poison_name = Some(name.to_string());
        self
    }

    pub fn with_on_commit(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_commit = Some(Arc::new(f));
        self
    }

    pub fn shared(&self) -> Arc<dyn SinkFactory> {
        Arc::new(self.clone())
    }

    pub fn commits(&self) -> usize {
        self.log.lock().unwrap().batches.len()
    }

    pub fn committed_count(&self) -> usize {
        self.log.lock().unwrap().committed().len()
    }
}

impl SinkFactory for RecordingFactory {
    fn open(&self) -> SinkResult<Box<dyn RecordSink>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSink {
            log: Arc::clone(&self.log),
            pending: Vec::new(),
            transient_left: self.transient_per_sink,
            poison_name: self.poison_name.clone(),
            on_commit: self.on_commit.clone(),
            next_id: 0,
        }))
    }
}

pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    pending: Vec<Record>,
    transient_left: u32,
    poison_name: Option<String>,
    on_commit: Option<Arc<dyn Fn() + Send + Sync>>,
    next_id: DocId,
}

impl RecordSink for RecordingSink {
    fn begin_batch(&mut self) -> SinkResult<()> {
        self.pending.clear();
        Ok(())
    }

    fn create_or_update(&mut self, record: &Record) -> SinkResult<DocId> {
        if self.poison_name.as_deref() == Some(record.name.as_str()) {
            return Err(SinkError::Permanent(format!("rejected {}", record.name)));
        }
        self.pending.push(record.clone());
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn commit_batch(&mut self) -> SinkResult<()> {
        if self.transient_left > 0 {
            self.transient_left -= 1;
            return Err(SinkError::Transient("store busy".into()));
        }
        let batch = std::mem::take(&mut self.pending);
        self.log.lock().unwrap().batches.push(batch);
        if let Some(f) = &self.on_commit {
            f();
        }
        Ok(())
    }

    fn rollback_batch(&mut self) -> SinkResult<()> {
        self.pending.clear();
        self.log.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

/// Record `name` under `parent`, with one string property.
pub fn record(parent: &str, name: &str) -> Record {
    let mut properties = Properties::new();
    properties.insert("dc:title".into(), PropertyValue::from(name));
    Record {
        target_path: parent.to_string(),
        doc_type: "File".to_string(),
        name: name.to_string(),
        properties,
        payload: None,
    }
}

/// `n` records named `rec-<i>` spread over `groups` parent folders below `/import`.
pub fn records(n: usize, groups: usize) -> Vec<Record> {
    (0..n)
        .map(|i| record(&format!("/import/group-{}", i % groups.max(1)), &format!("rec-{i}")))
        .collect()
}
