//! Hierarchical import sources.
//!
//! A source is a lazy tree of [`SourceNode`]s. Children are enumerated on demand and may fail
//! individually; a failed child skips that subtree only. Nodes are `Send` so a subtree can be
//! handed to another traversal thread.

pub mod fs;
pub mod memory;
pub mod random;
pub mod words;

pub use fs::FsNode;
pub use memory::MemoryNode;
pub use random::{RandomNode, RandomTreeSpec};

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::engine::hashing::{digest_bytes, digest_file};
use crate::engine::tools::guess_mime_type;
use crate::{BlobLocation, BlobRef, Properties};

/// Owned source node.
pub type NodeBox = Box<dyn SourceNode>;

/// Lazy, fallible child sequence.
pub type Children = Box<dyn Iterator<Item = Result<NodeBox>> + Send>;

/// Where a payload's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobSource {
    File(PathBuf),
    Inline(Vec<u8>),
}

/// Binary content attached to a leaf node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub filename: String,
    /// Declared MIME type; guessed from `filename` when None.
    pub mime_type: Option<String>,
    pub source: BlobSource,
}

impl Payload {
    pub fn inline(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            source: BlobSource::Inline(data),
        }
    }

    pub fn file(filename: impl Into<String>, path: PathBuf) -> Self {
        Self {
            filename: filename.into(),
            mime_type: None,
            source: BlobSource::File(path),
        }
    }

    /// Resolve to a record blob reference: digest and length are computed here, so file payloads
    /// are read once on the producing side.
    pub fn to_blob_ref(&self) -> Result<BlobRef> {
        let mime_type = self
            .mime_type
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| guess_mime_type(&self.filename).to_string());
        let (digest, length, location) = match &self.source {
            BlobSource::Inline(data) => (
                digest_bytes(data),
                data.len() as u64,
                BlobLocation::Inline(data.clone()),
            ),
            BlobSource::File(path) => {
                let size = std::fs::metadata(path)
                    .with_context(|| format!("stat blob {}", path.display()))?
                    .len();
                (
                    digest_file(path, size)?,
                    size,
                    BlobLocation::File(path.clone()),
                )
            }
        };
        Ok(BlobRef {
            digest,
            length,
            filename: self.filename.clone(),
            mime_type,
            location,
        })
    }
}

/// One node of an import source: a container with children, or a leaf with optional payload.
pub trait SourceNode: Send {
    fn name(&self) -> &str;

    fn is_container(&self) -> bool;

    fn payload(&self) -> Option<Payload>;

    fn properties(&self) -> Properties {
        Properties::new()
    }

    /// Enumerate children lazily. Leaves return an empty sequence.
    fn children(&self) -> Result<Children>;
}

/// Empty child sequence for leaves.
pub fn no_children() -> Children {
    Box::new(std::iter::empty())
}
