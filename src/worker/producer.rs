//! Producers: turn a source tree (or synthetic data) into records on the queue.

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use super::{Stoppable, Worker, WorkerControl};
use crate::queue::QueueManager;
use crate::sink::DocumentFactory;
use crate::source::words::{random_text, random_title, random_word};
use crate::source::{Children, NodeBox, Payload, SourceNode};
use crate::{PropertyValue, Properties, Record, join_store_path};

/// Walks a source tree depth-first (pre-order) and dispatches one record per node, so a
/// container's record is always dispatched before its children's.
pub struct TreeProducer {
    root: Option<NodeBox>,
    target: String,
    queue: Arc<QueueManager>,
    factory: DocumentFactory,
}

impl TreeProducer {
    /// Import `root` under the store path `target`.
    pub fn new(root: NodeBox, target: impl Into<String>, queue: Arc<QueueManager>) -> Self {
        Self {
            root: Some(root),
            target: target.into(),
            queue,
            factory: DocumentFactory::default(),
        }
    }

    pub fn with_factory(mut self, factory: DocumentFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Dispatch `node` under `parent`. Returns the frame to descend into for containers.
    /// Queue failures are fatal; a node that cannot be mapped or listed skips its subtree.
    fn visit(
        &self,
        parent: &str,
        node: &dyn SourceNode,
        control: &WorkerControl,
    ) -> Result<Option<(String, Children)>> {
        let record = match self.factory.to_record(parent, node) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping {}/{}: {:#}", parent.trim_end_matches('/'), node.name(), e);
                return Ok(None);
            }
        };
        self.queue
            .dispatch(&record)
            .with_context(|| format!("dispatch {}", record.path()))?;
        control.add_processed(1);

        if !node.is_container() {
            return Ok(None);
        }
        let path = record.path();
        match node.children() {
            Ok(children) => Ok(Some((path, children))),
            Err(e) => {
                warn!("cannot list {}, subtree skipped: {:#}", path, e);
                Ok(None)
            }
        }
    }
}

impl Worker for TreeProducer {
    type Output = ();

    fn run(&mut self, control: &WorkerControl) -> Result<()> {
        let root = self
            .root
            .take()
            .ok_or_else(|| anyhow!("tree producer already ran"))?;
        let mut stack: Vec<(String, Children)> = Vec::new();
        if let Some(frame) = self.visit(&self.target, root.as_ref(), control)? {
            stack.push(frame);
        }

        while let Some((parent, children)) = stack.last_mut() {
            if control.is_forced() {
                info!(
                    "producer stopped early after {} record(s)",
                    control.processed()
                );
                return Ok(());
            }
            match children.next() {
                None => {
                    stack.pop();
                }
                Some(Err(e)) => warn!("unreadable entry under {}: {:#}", parent, e),
                Some(Ok(node)) => {
                    let parent = parent.clone();
                    if let Some(frame) = self.visit(&parent, node.as_ref(), control)? {
                        stack.push(frame);
                    }
                }
            }
        }
        debug!("producer done: {} record(s) dispatched", control.processed());
        Ok(())
    }
}

/// Shape of a synthetic flat import: `documents` text documents in folders of `folder_size`.
#[derive(Clone, Debug)]
pub struct RandomDocsSpec {
    pub target: String,
    pub documents: usize,
    pub folder_size: usize,
    /// Average document size in bytes.
    pub avg_blob_size: usize,
    pub seed: u64,
}

impl RandomDocsSpec {
    pub fn folder_count(&self) -> usize {
        self.documents.div_ceil(self.folder_size.max(1))
    }

    /// Records a full run dispatches: every document plus one per folder.
    pub fn record_count(&self) -> usize {
        self.documents + self.folder_count()
    }
}

/// Dispatches synthetic documents for a contiguous range of folders. Several instances split
/// one [`RandomDocsSpec`] by whole folders (see [`RandomProducer::split`]).
pub struct RandomProducer {
    spec: Arc<RandomDocsSpec>,
    folders: std::ops::Range<usize>,
    queue: Arc<QueueManager>,
}

impl RandomProducer {
    pub fn new(spec: RandomDocsSpec, queue: Arc<QueueManager>) -> Self {
        let folders = 0..spec.folder_count();
        Self {
            spec: Arc::new(spec),
            folders,
            queue,
        }
    }

    /// `n` producers covering disjoint folder ranges of `spec`.
    pub fn split(spec: RandomDocsSpec, n: usize, queue: &Arc<QueueManager>) -> Vec<Self> {
        let spec = Arc::new(spec);
        let total = spec.folder_count();
        let n = n.max(1);
        (0..n)
            .map(|i| Self {
                spec: Arc::clone(&spec),
                folders: (i * total / n)..((i + 1) * total / n),
                queue: Arc::clone(queue),
            })
            .filter(|p| !p.folders.is_empty())
            .collect()
    }

    fn folder_record(&self, index: usize) -> Record {
        let name = format!("folder-{index:05}");
        let mut properties = Properties::new();
        properties.insert("dc:title".into(), PropertyValue::from(name.as_str()));
        Record {
            target_path: self.spec.target.clone(),
            doc_type: "Folder".to_string(),
            name,
            properties,
            payload: None,
        }
    }

    fn document_record(&self, folder_path: &str, index: usize) -> Result<Record> {
        let mut rng =
            StdRng::seed_from_u64(self.spec.seed ^ (index as u64).wrapping_mul(0x2545_F491));
        let name = format!("doc-{index:07}-{}.txt", random_word(&mut rng));
        let avg = self.spec.avg_blob_size.max(1);
        let size = rng.gen_range(avg / 2..=avg + avg / 2);
        let mut payload = Payload::inline(name.clone(), random_text(&mut rng, size).into_bytes());
        payload.mime_type = Some("text/plain".to_string());

        let mut properties = Properties::new();
        properties.insert("dc:title".into(), PropertyValue::String(random_title(&mut rng, 4)));
        properties.insert("file:filename".into(), PropertyValue::from(name.as_str()));
        Ok(Record {
            target_path: folder_path.to_string(),
            doc_type: "File".to_string(),
            name,
            properties,
            payload: Some(payload.to_blob_ref()?),
        })
    }
}

impl Worker for RandomProducer {
    type Output = ();

    fn run(&mut self, control: &WorkerControl) -> Result<()> {
        let folder_size = self.spec.folder_size.max(1);
        for folder in self.folders.clone() {
            let record = self.folder_record(folder);
            let folder_path = record.path();
            self.queue
                .dispatch(&record)
                .with_context(|| format!("dispatch {folder_path}"))?;
            control.add_processed(1);

            let first = folder * folder_size;
            let last = ((folder + 1) * folder_size).min(self.spec.documents);
            for index in first..last {
                if control.is_forced() {
                    info!("random producer stopped early after {} record(s)", control.processed());
                    return Ok(());
                }
                let record = self.document_record(&folder_path, index)?;
                self.queue
                    .dispatch(&record)
                    .with_context(|| {
                        format!("dispatch {}", join_store_path(&folder_path, &record.name))
                    })?;
                control.add_processed(1);
            }
        }
        Ok(())
    }
}
