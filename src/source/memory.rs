//! In-memory source tree, for embedding callers and tests.

use anyhow::Result;

use super::{Children, NodeBox, Payload, SourceNode};
use crate::{Properties, PropertyValue};

#[derive(Clone, Debug)]
pub struct MemoryNode {
    name: String,
    container: bool,
    payload: Option<Payload>,
    properties: Properties,
    children: Vec<MemoryNode>,
}

impl MemoryNode {
    pub fn folder(name: impl Into<String>, children: Vec<MemoryNode>) -> Self {
        Self {
            name: name.into(),
            container: true,
            payload: None,
            properties: Properties::new(),
            children,
        }
    }

    /// Leaf with inline content.
    pub fn document(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        Self {
            payload: Some(Payload::inline(name.clone(), data.into())),
            name,
            container: false,
            properties: Properties::new(),
            children: Vec::new(),
        }
    }

    /// Leaf without payload.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: false,
            payload: None,
            properties: Properties::new(),
            children: Vec::new(),
        }
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Total node count of this subtree, including itself.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(MemoryNode::count).sum::<usize>()
    }

    /// Leaf count of this subtree.
    pub fn leaf_count(&self) -> usize {
        if self.container {
            self.children.iter().map(MemoryNode::leaf_count).sum()
        } else {
            1
        }
    }
}

impl SourceNode for MemoryNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_container(&self) -> bool {
        self.container
    }

    fn payload(&self) -> Option<Payload> {
        self.payload.clone()
    }

    fn properties(&self) -> Properties {
        self.properties.clone()
    }

    fn children(&self) -> Result<Children> {
        let children = self.children.clone();
        Ok(Box::new(
            children.into_iter().map(|c| Ok(Box::new(c) as NodeBox)),
        ))
    }
}
