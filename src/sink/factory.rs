//! Node → Record mapping.

use anyhow::Result;

use crate::engine::tools::valid_name_from_filename;
use crate::source::SourceNode;
use crate::{PropertyValue, Record};

/// Property that overrides the document type of a node (ignored when empty).
pub const DOC_TYPE_PROPERTY: &str = "ecm:primaryType";

/// Maps source nodes to records: containers become `folderish_type`, leaves `leaf_type`,
/// unless the node carries a [`DOC_TYPE_PROPERTY`].
#[derive(Clone, Debug)]
pub struct DocumentFactory {
    pub folderish_type: String,
    pub leaf_type: String,
}

impl Default for DocumentFactory {
    fn default() -> Self {
        Self::new("Folder", "File")
    }
}

impl DocumentFactory {
    pub fn new(folderish_type: impl Into<String>, leaf_type: impl Into<String>) -> Self {
        Self {
            folderish_type: folderish_type.into(),
            leaf_type: leaf_type.into(),
        }
    }

    /// Build the record creating `node` under the store path `parent_path`.
    /// Leaf payloads are resolved to blob references here (file content is digested).
    pub fn to_record(&self, parent_path: &str, node: &dyn SourceNode) -> Result<Record> {
        let mut properties = node.properties();
        let override_type = match properties.remove(DOC_TYPE_PROPERTY) {
            Some(PropertyValue::String(t)) if !t.is_empty() => Some(t),
            _ => None,
        };
        let doc_type = override_type.unwrap_or_else(|| {
            if node.is_container() {
                self.folderish_type.clone()
            } else {
                self.leaf_type.clone()
            }
        });

        properties.insert("dc:title".into(), PropertyValue::from(node.name()));
        let payload = if node.is_container() {
            None
        } else {
            match node.payload() {
                Some(p) => {
                    properties.insert(
                        "file:filename".into(),
                        PropertyValue::from(p.filename.as_str()),
                    );
                    Some(p.to_blob_ref()?)
                }
                None => None,
            }
        };

        Ok(Record {
            target_path: parent_path.to_string(),
            doc_type,
            name: valid_name_from_filename(node.name()),
            properties,
            payload,
        })
    }
}
