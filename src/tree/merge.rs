//! Recursive merge of a nested-mapping document into a node subtree.
//!
//! Merging is additive per key: nested mappings merge field-by-field into
//! the existing child node, everything else (scalars, sequences, nulls)
//! replaces the child entirely.

use crate::error::Result;
use crate::tree::node::ConfigNode;
use serde_json::{Map, Value};

/// Merge `document` into `node`, creating child nodes as needed.
///
/// Called only while the tree is unlocked; lock enforcement happens
/// transitively through the node's `get`/`set`.
pub fn merge_document(node: &ConfigNode, document: &Map<String, Value>) -> Result<()> {
    for (key, value) in document {
        match value {
            Value::Object(nested) => merge_document(&node.child(key)?, nested)?,
            other => node.set(key, other.clone())?,
        }
    }
    Ok(())
}
