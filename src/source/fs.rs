//! Filesystem source: directories are containers, regular files are leaves with a file payload.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::{Children, NodeBox, Payload, SourceNode, no_children};
use crate::engine::tools::{mtime_ns, should_include_source};
use crate::{Properties, PropertyValue};

/// A directory or file on disk. Children are listed one directory level at a time, sorted by
/// name, skipping OS clutter and exclude patterns.
#[derive(Clone, Debug)]
pub struct FsNode {
    path: PathBuf,
    name: String,
    is_dir: bool,
    is_file: bool,
    size: u64,
    mtime_ns: i64,
    exclude: Arc<Vec<String>>,
}

impl FsNode {
    /// Open `path` as a source root.
    pub fn open(path: &Path, exclude: Vec<String>) -> Result<Self> {
        let path = path
            .canonicalize()
            .with_context(|| format!("canonicalize source {}", path.display()))?;
        let meta = std::fs::metadata(&path)
            .with_context(|| format!("read source metadata {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        Ok(Self {
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            size: meta.len(),
            mtime_ns: mtime_ns(&meta),
            path,
            name,
            exclude: Arc::new(exclude),
        })
    }

    fn from_entry(entry: walkdir::DirEntry, exclude: Arc<Vec<String>>) -> Result<Self> {
        let meta = entry
            .metadata()
            .with_context(|| format!("read metadata {}", entry.path().display()))?;
        Ok(Self {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            is_file: meta.is_file(),
            size: meta.len(),
            mtime_ns: mtime_ns(&meta),
            path: entry.into_path(),
            exclude,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceNode for FsNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_container(&self) -> bool {
        self.is_dir
    }

    fn payload(&self) -> Option<Payload> {
        self.is_file
            .then(|| Payload::file(self.name.clone(), self.path.clone()))
    }

    fn properties(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("fs:mtime_ns".into(), PropertyValue::Int(self.mtime_ns));
        if self.is_file {
            props.insert("fs:size".into(), PropertyValue::Int(self.size as i64));
        }
        props
    }

    fn children(&self) -> Result<Children> {
        if !self.is_dir {
            return Ok(no_children());
        }
        let exclude = Arc::clone(&self.exclude);
        let filter = Arc::clone(&self.exclude);
        let iter = WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| should_include_source(e.path(), &filter))
            .map(move |r| {
                let entry = r.context("list directory")?;
                Ok(Box::new(FsNode::from_entry(entry, Arc::clone(&exclude))?) as NodeBox)
            });
        Ok(Box::new(iter))
    }
}
