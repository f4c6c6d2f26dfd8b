//! Deterministic synthetic source tree.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use super::words::{random_text, random_title};
use super::{Children, NodeBox, Payload, SourceNode, no_children};
use crate::{Properties, PropertyValue};

/// Shape of a synthetic tree. Every folder above `depth` holds `folders` sub-folders and
/// `documents` text documents; folders at `depth` hold documents only.
#[derive(Clone, Debug)]
pub struct RandomTreeSpec {
    pub depth: usize,
    pub folders: usize,
    pub documents: usize,
    /// Average document size in bytes (actual sizes vary between half and 1.5x).
    pub avg_blob_size: usize,
    pub seed: u64,
}

impl RandomTreeSpec {
    /// Number of documents the tree yields.
    pub fn document_count(&self) -> usize {
        // folders at level l: folders^(l-1), for l in 1..=depth
        (0..self.depth)
            .map(|l| {
                let level = l.min(u32::MAX as usize) as u32;
                self.folders.saturating_pow(level).saturating_mul(self.documents)
            })
            .fold(0, usize::saturating_add)
    }
}

#[derive(Clone, Debug)]
pub struct RandomNode {
    spec: Arc<RandomTreeSpec>,
    name: String,
    /// 1 for the root folder.
    level: usize,
    container: bool,
    seed: u64,
}

impl RandomNode {
    pub fn root(spec: RandomTreeSpec) -> Self {
        let seed = spec.seed;
        Self {
            spec: Arc::new(spec),
            name: "random-import".to_string(),
            level: 1,
            container: true,
            seed,
        }
    }

    fn child(&self, index: usize, container: bool) -> Self {
        // splitmix-style derivation keeps sibling seeds independent and stable.
        let seed = self
            .seed
            .wrapping_add((index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .rotate_left(17)
            ^ (self.level as u64);
        let mut rng = StdRng::seed_from_u64(seed);
        let name = if container {
            format!("folder-{index}-{}", super::words::random_word(&mut rng))
        } else {
            format!("doc-{index}-{}.txt", super::words::random_word(&mut rng))
        };
        Self {
            spec: Arc::clone(&self.spec),
            name,
            level: self.level + 1,
            container,
            seed,
        }
    }

    fn text(&self) -> String {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let avg = self.spec.avg_blob_size.max(1);
        let size = rng.gen_range(avg / 2..=avg + avg / 2);
        random_text(&mut rng, size)
    }
}

impl SourceNode for RandomNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_container(&self) -> bool {
        self.container
    }

    fn payload(&self) -> Option<Payload> {
        if self.container {
            return None;
        }
        let mut payload = Payload::inline(self.name.clone(), self.text().into_bytes());
        payload.mime_type = Some("text/plain".to_string());
        Some(payload)
    }

    fn properties(&self) -> Properties {
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0x5bd1_e995);
        let mut props = Properties::new();
        props.insert(
            "dc:description".into(),
            PropertyValue::String(random_title(&mut rng, 6)),
        );
        props.insert("random:level".into(), PropertyValue::Int(self.level as i64));
        props
    }

    fn children(&self) -> Result<Children> {
        if !self.container {
            return Ok(no_children());
        }
        let parent = self.clone();
        let folders = if self.level < self.spec.depth {
            self.spec.folders
        } else {
            0
        };
        let documents = self.spec.documents;
        let iter = (0..folders)
            .map(|i| (i, true))
            .chain((0..documents).map(|i| (i, false)))
            .map(move |(i, container)| Ok(Box::new(parent.child(i, container)) as NodeBox));
        Ok(Box::new(iter))
    }
}
