//! Core merge/lock/lazy-navigation engine.
//!
//! The tree itself knows nothing about files or environments; it only
//! implements guarded navigation ([`ConfigNode::get`]/[`ConfigNode::set`])
//! and the recursive document merge. Environment selection and directive
//! replay live in [`crate::loader`].

mod merge;
mod node;

pub use merge::merge_document;
pub use node::{ConfigNode, ConfigTree, Entry, UnlockGuard};
