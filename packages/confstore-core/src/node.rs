use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::path::Path;

#[derive(Clone, Debug)]
enum Content {
    Leaf(Value),
    Branch(BTreeMap<String, Node>),
}

/// A vertex of the store tree: a leaf holding one value, or a branch holding
/// named children. Interior names auto-vivify as empty branches the first
/// time a path is written through them.
///
/// The tree is an owned recursive map; children live inside their parent and
/// disappear with it. Every access goes through the store's lock, so no
/// aliasing can outlive a critical section.
#[derive(Clone, Debug)]
pub struct Node {
    content: Content,
    expires: Option<DateTime<Utc>>,
}

impl Default for Node {
    fn default() -> Self {
        Node::new()
    }
}

impl Node {
    /// Empty branch. Serializes as `{}`.
    pub fn new() -> Self {
        Node {
            content: Content::Branch(BTreeMap::new()),
            expires: None,
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let mut node = Node::new();
        node.apply_value(value);
        node
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, Content::Leaf(_))
    }

    /// The leaf value, if this node is a leaf.
    pub fn leaf(&self) -> Option<&Value> {
        match &self.content {
            Content::Leaf(v) => Some(v),
            Content::Branch(_) => None,
        }
    }

    /// The leaf's array elements, if this node is a leaf holding an array.
    pub fn leaf_array(&self) -> Option<&Vec<Value>> {
        match self.leaf() {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    /// How many leading segments of `path` resolve against this tree. Equal
    /// to `path.depth()` iff the full path exists.
    pub fn exists(&self, path: &Path) -> usize {
        let mut current = self;
        for (i, seg) in path.segments().iter().enumerate() {
            match &current.content {
                Content::Branch(children) => match children.get(seg) {
                    Some(child) => current = child,
                    None => return i,
                },
                Content::Leaf(_) => return i,
            }
        }
        path.depth()
    }

    pub fn has(&self, path: &Path) -> bool {
        self.exists(path) == path.depth()
    }

    /// Non-creating lookup.
    pub fn lookup(&self, path: &Path) -> Option<&Node> {
        let mut current = self;
        for seg in path.segments() {
            match &current.content {
                Content::Branch(children) => current = children.get(seg)?,
                Content::Leaf(_) => return None,
            }
        }
        Some(current)
    }

    fn lookup_mut(&mut self, path: &Path) -> Option<&mut Node> {
        let mut current = self;
        for seg in path.segments() {
            match &mut current.content {
                Content::Branch(children) => current = children.get_mut(seg)?,
                Content::Leaf(_) => return None,
            }
        }
        Some(current)
    }

    /// Auto-vivifying navigation: missing interior names become empty
    /// branches, and writing through a leaf replaces it with a branch.
    pub fn navigate(&mut self, path: &Path) -> &mut Node {
        let mut current = self;
        for seg in path.segments() {
            if !matches!(current.content, Content::Branch(_)) {
                current.content = Content::Branch(BTreeMap::new());
            }
            let Content::Branch(children) = &mut current.content else {
                unreachable!()
            };
            current = children.entry(seg.clone()).or_default();
        }
        current
    }

    /// Remove the node at `path` from its parent. Removing the root clears
    /// the whole tree. Returns the removed node, or `None` if the path did
    /// not resolve.
    pub fn remove(&mut self, path: &Path) -> Option<Node> {
        let Some(parent) = path.parent() else {
            let old = std::mem::take(self);
            return Some(old);
        };
        let name = path.segments().last()?;
        let parent_node = self.lookup_mut(&parent)?;
        match &mut parent_node.content {
            Content::Branch(children) => children.remove(name),
            Content::Leaf(_) => None,
        }
    }

    /// Wholesale replacement of this node's content: objects become branches
    /// recursively, everything else a leaf. Expiry is left to the caller.
    pub fn apply_value(&mut self, value: &Value) {
        match value {
            Value::Object(entries) => {
                let mut children = BTreeMap::new();
                for (name, v) in entries {
                    children.insert(name.clone(), Node::from_value(v));
                }
                self.content = Content::Branch(children);
            }
            other => self.content = Content::Leaf(other.clone()),
        }
    }

    /// Numeric leaf arithmetic. An absent or vacant node counts as 0; an
    /// existing non-numeric value fails the key.
    pub fn add(&mut self, step: i64) -> Result<()> {
        let current = match &self.content {
            Content::Leaf(Value::Number(n)) => Some(n.clone()),
            Content::Leaf(Value::Null) => None,
            Content::Leaf(other) => {
                return Err(Error::InvalidMutation(format!(
                    "cannot increment non-numeric value {}",
                    other
                )))
            }
            Content::Branch(children) if children.is_empty() => None,
            Content::Branch(_) => {
                return Err(Error::InvalidMutation(
                    "cannot increment an interior node".into(),
                ))
            }
        };
        let next = match current {
            Some(n) if n.is_i64() || n.is_u64() => {
                Number::from(n.as_i64().unwrap_or_default().saturating_add(step))
            }
            Some(n) => {
                let f = n.as_f64().unwrap_or_default() + step as f64;
                Number::from_f64(f).unwrap_or_else(|| Number::from(0))
            }
            None => Number::from(step),
        };
        self.content = Content::Leaf(Value::Number(next));
        Ok(())
    }

    /// Append to the array leaf. A non-array current value is replaced by a
    /// singleton array.
    pub fn push(&mut self, value: &Value) {
        let mut items = self.leaf_array().cloned().unwrap_or_default();
        items.push(value.clone());
        self.content = Content::Leaf(Value::Array(items));
    }

    /// Prepend to the array leaf; same non-array handling as `push`.
    pub fn prepend(&mut self, value: &Value) {
        let mut items = self.leaf_array().cloned().unwrap_or_default();
        items.insert(0, value.clone());
        self.content = Content::Leaf(Value::Array(items));
    }

    /// Drop the last element; a non-array current value becomes the empty
    /// array.
    pub fn pop(&mut self) {
        let mut items = self.leaf_array().cloned().unwrap_or_default();
        items.pop();
        self.content = Content::Leaf(Value::Array(items));
    }

    /// Drop the first element; same non-array handling as `pop`.
    pub fn shift(&mut self) {
        let mut items = self.leaf_array().cloned().unwrap_or_default();
        if !items.is_empty() {
            items.remove(0);
        }
        self.content = Content::Leaf(Value::Array(items));
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn set_expiry(&mut self, when: DateTime<Utc>) {
        self.expires = Some(when);
    }

    pub fn clear_expiry(&mut self) {
        self.expires = None;
    }

    /// Serialize back to a value. Branch children whose name starts with `.`
    /// are skipped unless `show_hidden` is set.
    pub fn to_value(&self, show_hidden: bool) -> Value {
        match &self.content {
            Content::Leaf(v) => v.clone(),
            Content::Branch(children) => {
                let mut out = Map::new();
                for (name, child) in children {
                    if !show_hidden && name.starts_with('.') {
                        continue;
                    }
                    out.insert(name.clone(), child.to_value(show_hidden));
                }
                Value::Object(out)
            }
        }
    }

    /// Structural equality against a plain value: the serialized forms must
    /// be deep-equal. Preconditions compare absent nodes as empty branches,
    /// which serialize to `{}`.
    pub fn matches_value(&self, value: &Value) -> bool {
        self.to_value(true) == *value
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.to_value(true) == other.to_value(true)
    }
}

impl Eq for Node {}
