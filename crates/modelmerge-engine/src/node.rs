//! Document tree model.
//!
//! A [`Node`] is one element of a parsed model: a type tag plus an ordered set
//! of named properties. Each property holds a scalar JSON value, a single
//! child node, or an array of child nodes. Nodes also carry a process-unique
//! [`NodeHandle`] and container bookkeeping, both kept outside the property
//! map so they are never diffed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

/// Property under which the JSON interchange format stores the type tag.
pub const TYPE_KEY: &str = "$type";

/// Prefix of reserved property names. Reserved properties are carried through
/// but never reflected or diffed.
pub const RESERVED_PREFIX: char = '$';

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn fresh_handle() -> NodeHandle {
    NodeHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// Identity of one node instance.
///
/// Handles are issued from a process-wide counter, so the BASE, OURS and
/// THEIRS trees of a session never share one. `Clone` on [`Node`] keeps
/// handles (structural copy of the same instances); [`Node::detached_copy`]
/// issues new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a node sits inside its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Containment {
    pub parent: NodeHandle,
    pub property: String,
    /// Position in the parent's array, `None` for a single-child property.
    pub index: Option<usize>,
}

/// Value of one node property.
#[derive(Debug, Clone)]
pub enum Prop {
    Scalar(Value),
    Child(Box<Node>),
    Children(Vec<Node>),
}

/// Errors raised while turning JSON into a node tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("expected a JSON object for a node, found {0}")]
    NotAnObject(&'static str),
    #[error("node is missing a string \"$type\" property")]
    MissingType,
    #[error("node has an empty \"$type\"")]
    EmptyType,
}

/// A tree element with a type tag and named properties.
#[derive(Debug, Clone)]
pub struct Node {
    handle: NodeHandle,
    kind: String,
    props: IndexMap<String, Prop>,
    containment: Option<Containment>,
}

impl Node {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            handle: fresh_handle(),
            kind: kind.into(),
            props: IndexMap::new(),
            containment: None,
        }
    }

    pub fn with_scalar(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_scalar(name, value.into());
        self
    }

    pub fn with_child(mut self, name: impl Into<String>, child: Node) -> Self {
        self.set_child(name, child);
        self
    }

    pub fn with_children(mut self, name: impl Into<String>, children: Vec<Node>) -> Self {
        let name = name.into();
        self.props.insert(name.clone(), Prop::Children(children));
        self.stamp_property(&name);
        self
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn containment(&self) -> Option<&Containment> {
        self.containment.as_ref()
    }

    pub fn props(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn prop(&self, name: &str) -> Option<&Prop> {
        self.props.get(name)
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    /// Scalar value of a property as the diff sees it. An empty node array
    /// reads as an empty JSON array so it compares equal to a scalar `[]`.
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        match self.props.get(name)? {
            Prop::Scalar(v) => Some(v),
            Prop::Children(items) if items.is_empty() => Some(&EMPTY_ARRAY),
            _ => None,
        }
    }

    pub fn str_prop(&self, name: &str) -> Option<&str> {
        match self.props.get(name)? {
            Prop::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        match self.props.get(name)? {
            Prop::Child(c) => Some(c),
            _ => None,
        }
    }

    /// Items of a node-array property; empty when absent or not an array.
    pub fn children(&self, name: &str) -> &[Node] {
        match self.props.get(name) {
            Some(Prop::Children(items)) => items,
            _ => &[],
        }
    }

    pub fn set_scalar(&mut self, name: impl Into<String>, value: Value) {
        self.props.insert(name.into(), Prop::Scalar(value));
    }

    /// Write a scalar, or drop the property when `value` is `None`.
    pub fn write_scalar(&mut self, name: &str, value: Option<Value>) {
        match value {
            Some(v) => self.set_scalar(name, v),
            None => {
                self.props.shift_remove(name);
            }
        }
    }

    pub fn set_child(&mut self, name: impl Into<String>, child: Node) {
        let name = name.into();
        self.props.insert(name.clone(), Prop::Child(Box::new(child)));
        self.stamp_property(&name);
    }

    /// Append to a node-array property, creating it when missing. A scalar
    /// in the way (e.g. an empty `[]` read from JSON) is replaced.
    pub fn push_child(&mut self, name: &str, child: Node) {
        match self.props.get_mut(name) {
            Some(Prop::Children(items)) => items.push(child),
            _ => {
                self.props
                    .insert(name.to_string(), Prop::Children(vec![child]));
            }
        }
        self.stamp_property(name);
    }

    /// Remove the first array item matching `pred` and re-index the rest.
    /// Returns whether an item was removed.
    pub fn remove_child_where(&mut self, name: &str, mut pred: impl FnMut(&Node) -> bool) -> bool {
        let removed = match self.props.get_mut(name) {
            Some(Prop::Children(items)) => match items.iter().position(|item| pred(item)) {
                Some(pos) => {
                    items.remove(pos);
                    true
                }
                None => false,
            },
            _ => false,
        };
        if removed {
            self.stamp_property(name);
        }
        removed
    }

    pub fn remove_prop(&mut self, name: &str) -> Option<Prop> {
        self.props.shift_remove(name)
    }

    /// Number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self
            .props
            .values()
            .map(|p| match p {
                Prop::Scalar(_) => 0,
                Prop::Child(c) => c.size(),
                Prop::Children(items) => items.iter().map(Node::size).sum(),
            })
            .sum::<usize>()
    }

    /// Depth-first lookup by handle.
    pub fn find(&self, handle: NodeHandle) -> Option<&Node> {
        if self.handle == handle {
            return Some(self);
        }
        self.props.values().find_map(|p| match p {
            Prop::Scalar(_) => None,
            Prop::Child(c) => c.find(handle),
            Prop::Children(items) => items.iter().find_map(|c| c.find(handle)),
        })
    }

    pub fn find_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        if self.handle == handle {
            return Some(self);
        }
        for p in self.props.values_mut() {
            let found = match p {
                Prop::Scalar(_) => None,
                Prop::Child(c) => c.find_mut(handle),
                Prop::Children(items) => items.iter_mut().find_map(|c| c.find_mut(handle)),
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Deep copy with fresh handles and no container of its own. Bookkeeping
    /// inside the copy is re-stamped against the new handles.
    pub fn detached_copy(&self) -> Node {
        let props = self
            .props
            .iter()
            .map(|(k, p)| {
                let p = match p {
                    Prop::Scalar(v) => Prop::Scalar(v.clone()),
                    Prop::Child(c) => Prop::Child(Box::new(c.detached_copy())),
                    Prop::Children(items) => {
                        Prop::Children(items.iter().map(Node::detached_copy).collect())
                    }
                };
                (k.clone(), p)
            })
            .collect();
        let mut copy = Node {
            handle: fresh_handle(),
            kind: self.kind.clone(),
            props,
            containment: None,
        };
        copy.restamp();
        copy
    }

    /// Recompute parent/property/index bookkeeping for the whole subtree.
    pub fn restamp(&mut self) {
        let names: Vec<String> = self.props.keys().cloned().collect();
        for name in names {
            self.stamp_property(&name);
            match self.props.get_mut(&name) {
                Some(Prop::Child(c)) => c.restamp(),
                Some(Prop::Children(items)) => items.iter_mut().for_each(Node::restamp),
                _ => {}
            }
        }
    }

    fn stamp_property(&mut self, name: &str) {
        let parent = self.handle;
        match self.props.get_mut(name) {
            Some(Prop::Child(c)) => {
                c.containment = Some(Containment {
                    parent,
                    property: name.to_string(),
                    index: None,
                });
            }
            Some(Prop::Children(items)) => {
                for (i, item) in items.iter_mut().enumerate() {
                    item.containment = Some(Containment {
                        parent,
                        property: name.to_string(),
                        index: Some(i),
                    });
                }
            }
            _ => {}
        }
    }

    /// Equality of type tags and properties, ignoring handles and bookkeeping.
    pub fn structurally_equal(&self, other: &Node) -> bool {
        if self.kind != other.kind || self.props.len() != other.props.len() {
            return false;
        }
        self.props.iter().all(|(name, p)| match (p, other.props.get(name)) {
            (Prop::Scalar(a), Some(Prop::Scalar(b))) => a == b,
            (Prop::Child(a), Some(Prop::Child(b))) => a.structurally_equal(b),
            (Prop::Children(a), Some(Prop::Children(b))) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.structurally_equal(y))
            }
            _ => false,
        })
    }

    /// Build a tree from the JSON interchange format: objects carrying a
    /// string `"$type"` are nodes, non-empty arrays made only of such objects
    /// are child arrays, everything else is a scalar.
    pub fn from_json(value: &Value) -> Result<Node, TreeError> {
        let obj = match value {
            Value::Object(obj) => obj,
            other => return Err(TreeError::NotAnObject(json_kind(other))),
        };
        let kind = match obj.get(TYPE_KEY) {
            Some(Value::String(s)) if s.is_empty() => return Err(TreeError::EmptyType),
            Some(Value::String(s)) => s.clone(),
            _ => return Err(TreeError::MissingType),
        };
        let mut node = Node::new(kind);
        for (name, v) in obj {
            if name == TYPE_KEY {
                continue;
            }
            let prop = if is_node_object(v) {
                Prop::Child(Box::new(Node::from_json(v)?))
            } else {
                match v {
                    Value::Array(items) if items.is_empty() => Prop::Children(Vec::new()),
                    Value::Array(items) if items.iter().all(is_node_object) => Prop::Children(
                        items.iter().map(Node::from_json).collect::<Result<_, _>>()?,
                    ),
                    other => Prop::Scalar(other.clone()),
                }
            };
            node.props.insert(name.clone(), prop);
        }
        node.restamp();
        Ok(node)
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(TYPE_KEY.to_string(), Value::String(self.kind.clone()));
        for (name, p) in &self.props {
            let v = match p {
                Prop::Scalar(v) => v.clone(),
                Prop::Child(c) => c.to_json(),
                Prop::Children(items) => Value::Array(items.iter().map(Node::to_json).collect()),
            };
            obj.insert(name.clone(), v);
        }
        Value::Object(obj)
    }
}

static EMPTY_ARRAY: Value = Value::Array(Vec::new());

/// Reserved names are skipped by reflection and the scalar diff.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

fn is_node_object(v: &Value) -> bool {
    matches!(v, Value::Object(obj) if matches!(obj.get(TYPE_KEY), Some(Value::String(_))))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
