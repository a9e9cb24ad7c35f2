//! Configuration nodes and the shared tree lock.
//!
//! A hierarchy is a tree of [`ConfigNode`]s that all reference one
//! [`ConfigTree`] lock flag. While the tree is unlocked, navigating to a
//! missing key materializes an empty child node; once locked, the same
//! lookup is a hard [`Error::UndefinedKey`] instead of a silent default.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Shared lock flag for one configuration hierarchy.
///
/// Every node in a hierarchy holds an `Rc` to the same `ConfigTree`, so a
/// single `lock()`/`unlock()` is observed by the whole tree at once. This is
/// a correctness guard against post-initialization writes, not a mutex.
#[derive(Debug, Default)]
pub struct ConfigTree {
    locked: Cell<bool>,
}

impl ConfigTree {
    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    pub fn lock(&self) {
        self.locked.set(true);
    }

    pub fn unlock(&self) {
        self.locked.set(false);
    }
}

/// Scoped unlock that re-locks the tree on drop.
///
/// Directive application brackets every merge with one of these, so the tree
/// ends up locked on every exit path, including early returns on error.
pub struct UnlockGuard {
    tree: Rc<ConfigTree>,
}

impl UnlockGuard {
    pub fn new(tree: Rc<ConfigTree>) -> Self {
        tree.unlock();
        Self { tree }
    }
}

impl Drop for UnlockGuard {
    fn drop(&mut self) {
        self.tree.lock();
    }
}

/// One stored child: a scalar leaf or a nested node.
#[derive(Debug, Clone)]
pub enum Entry {
    Leaf(Value),
    Node(ConfigNode),
}

impl Entry {
    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            Entry::Leaf(value) => Some(value),
            Entry::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&ConfigNode> {
        match self {
            Entry::Leaf(_) => None,
            Entry::Node(node) => Some(node),
        }
    }

    /// Plain-data snapshot of this entry.
    pub fn to_value(&self) -> Value {
        match self {
            Entry::Leaf(value) => value.clone(),
            Entry::Node(node) => node.to_value(),
        }
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Leaf(value)
    }
}

impl From<ConfigNode> for Entry {
    fn from(node: ConfigNode) -> Self {
        Entry::Node(node)
    }
}

#[derive(Debug)]
struct NodeInner {
    /// Dotted display path from the root, e.g. `config.database.host`.
    /// Diagnostics only, never used for lookup.
    name: String,
    /// Keys from the root down to this node.
    path: Vec<String>,
    children: BTreeMap<String, Entry>,
    tree: Rc<ConfigTree>,
}

impl NodeInner {
    fn make_child(&self, key: &str) -> ConfigNode {
        let mut path = self.path.clone();
        path.push(key.to_string());
        ConfigNode {
            inner: Rc::new(RefCell::new(NodeInner {
                name: format!("{}.{}", self.name, key),
                path,
                children: BTreeMap::new(),
                tree: Rc::clone(&self.tree),
            })),
        }
    }
}

/// Cheap cloneable handle to one point in the configuration hierarchy.
///
/// Cloning a `ConfigNode` clones the handle, not the subtree: repeated
/// navigation to the same key always observes the same underlying node.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    inner: Rc<RefCell<NodeInner>>,
}

impl ConfigNode {
    /// New empty root node named `config`, with a fresh unlocked tree.
    pub fn root() -> Self {
        Self {
            inner: Rc::new(RefCell::new(NodeInner {
                name: "config".to_string(),
                path: Vec::new(),
                children: BTreeMap::new(),
                tree: Rc::new(ConfigTree::default()),
            })),
        }
    }

    /// Look up `key`, lazily creating an empty child node when the tree is
    /// unlocked. On a locked tree a missing key is [`Error::UndefinedKey`].
    pub fn get(&self, key: &str) -> Result<Entry> {
        let mut inner = self.inner.borrow_mut();
        if let Some(entry) = inner.children.get(key) {
            return Ok(entry.clone());
        }
        if inner.tree.is_locked() {
            return Err(Error::UndefinedKey {
                path: inner.name.clone(),
                key: key.to_string(),
            });
        }
        let child = inner.make_child(key);
        inner
            .children
            .insert(key.to_string(), Entry::Node(child.clone()));
        Ok(Entry::Node(child))
    }

    /// Overwrite or create the child under `key`. Fails on a locked tree.
    pub fn set(&self, key: &str, entry: impl Into<Entry>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.tree.is_locked() {
            return Err(Error::Locked {
                key: key.to_string(),
                node: inner.name.clone(),
            });
        }
        inner.children.insert(key.to_string(), entry.into());
        Ok(())
    }

    /// Child node under `key`, creating it if missing. A pre-existing leaf
    /// under `key` is replaced by a fresh empty node.
    pub fn child(&self, key: &str) -> Result<ConfigNode> {
        match self.get(key)? {
            Entry::Node(node) => Ok(node),
            Entry::Leaf(_) => {
                let node = self.inner.borrow().make_child(key);
                self.set(key, node.clone())?;
                Ok(node)
            }
        }
    }

    /// Remove all children. Only used when a full rebuild is about to
    /// repopulate the tree, so it is not lock-checked.
    pub fn clear(&self) {
        self.inner.borrow_mut().children.clear();
    }

    /// Deep snapshot of this subtree as plain data. Mutating the snapshot
    /// never affects the live tree.
    pub fn to_value(&self) -> Value {
        let inner = self.inner.borrow();
        let mut map = Map::new();
        for (key, entry) in &inner.children {
            map.insert(key.clone(), entry.to_value());
        }
        Value::Object(map)
    }

    /// Deterministic diagnostic rendering: one `<dotted-path> = <value>`
    /// line per leaf, siblings in sorted key order.
    pub fn render(&self) -> String {
        let inner = self.inner.borrow();
        let mut out = Vec::new();
        for (key, entry) in &inner.children {
            match entry {
                Entry::Node(node) => {
                    let nested = node.render();
                    if !nested.is_empty() {
                        out.push(nested);
                    }
                }
                Entry::Leaf(value) => {
                    out.push(format!("{}.{} = {}", inner.name, key, value));
                }
            }
        }
        out.join("\n")
    }

    /// Dotted display path of this node.
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    /// Keys from the root down to this node.
    pub fn path(&self) -> Vec<String> {
        self.inner.borrow().path.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.borrow().tree.is_locked()
    }

    /// Shared lock flag of the hierarchy this node belongs to.
    pub fn tree(&self) -> Rc<ConfigTree> {
        Rc::clone(&self.inner.borrow().tree)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.borrow().children.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().children.keys().cloned().collect()
    }

    /// Children in sorted key order.
    pub fn items(&self) -> Vec<(String, Entry)> {
        self.inner
            .borrow()
            .children
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unlocked_get_creates_child() {
        let root = ConfigNode::root();
        let entry = root.get("database").unwrap();
        let node = entry.as_node().expect("expected a node");
        assert_eq!(node.name(), "config.database");
        assert_eq!(node.path(), vec!["database".to_string()]);
        assert!(root.contains_key("database"));
    }

    #[test]
    fn test_unlocked_get_is_idempotent() {
        let root = ConfigNode::root();
        let first = root.get("a").unwrap();
        let second = root.get("a").unwrap();
        assert!(Rc::ptr_eq(
            &first.as_node().unwrap().inner,
            &second.as_node().unwrap().inner
        ));
    }

    #[test]
    fn test_locked_get_fails_without_creating() {
        let root = ConfigNode::root();
        root.tree().lock();
        let err = root.get("missing").unwrap_err();
        assert!(matches!(
            err,
            Error::UndefinedKey { ref path, ref key }
                if path == "config" && key == "missing"
        ));
        assert!(!root.contains_key("missing"));
    }

    #[test]
    fn test_locked_set_fails_without_mutating() {
        let root = ConfigNode::root();
        root.set("a", json!(1)).unwrap();
        root.tree().lock();
        let err = root.set("b", json!(2)).unwrap_err();
        assert!(matches!(err, Error::Locked { .. }));
        assert_eq!(root.keys(), vec!["a".to_string()]);
    }

    #[test]
    fn test_lock_is_shared_across_nodes() {
        let root = ConfigNode::root();
        let child = root.child("nested").unwrap();
        root.tree().lock();
        assert!(child.is_locked());
        assert!(matches!(
            child.set("x", json!(1)),
            Err(Error::Locked { .. })
        ));
        root.tree().unlock();
        assert!(!child.is_locked());
        child.set("x", json!(1)).unwrap();
    }

    #[test]
    fn test_unlock_guard_relocks_on_drop() {
        let root = ConfigNode::root();
        root.tree().lock();
        {
            let _guard = UnlockGuard::new(root.tree());
            assert!(!root.is_locked());
            root.set("a", json!(1)).unwrap();
        }
        assert!(root.is_locked());
    }

    #[test]
    fn test_child_replaces_leaf() {
        let root = ConfigNode::root();
        root.set("a", json!(1)).unwrap();
        let node = root.child("a").unwrap();
        node.set("b", json!(2)).unwrap();
        assert_eq!(root.to_value(), json!({"a": {"b": 2}}));
    }

    #[test]
    fn test_to_value_is_a_deep_snapshot() {
        let root = ConfigNode::root();
        let db = root.child("database").unwrap();
        db.set("host", json!("localhost")).unwrap();
        let snapshot = root.to_value();
        db.set("host", json!("remote")).unwrap();
        assert_eq!(snapshot, json!({"database": {"host": "localhost"}}));
    }

    #[test]
    fn test_render_sorted_one_line_per_leaf() {
        let root = ConfigNode::root();
        root.set("zebra", json!(1)).unwrap();
        root.set("apple", json!("red")).unwrap();
        let db = root.child("database").unwrap();
        db.set("port", json!(5432)).unwrap();
        assert_eq!(
            root.render(),
            "config.apple = \"red\"\nconfig.database.port = 5432\nconfig.zebra = 1"
        );
    }

    #[test]
    fn test_render_skips_empty_nodes() {
        let root = ConfigNode::root();
        root.child("empty").unwrap();
        root.set("a", json!(true)).unwrap();
        assert_eq!(root.render(), "config.a = true");
    }

    #[test]
    fn test_clear_ignores_lock() {
        let root = ConfigNode::root();
        root.set("a", json!(1)).unwrap();
        root.tree().lock();
        root.clear();
        assert!(root.is_empty());
    }
}
