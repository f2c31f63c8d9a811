//! Side table from change keys to the node instances each change describes.

use std::collections::HashMap;

use crate::node::{Node, NodeHandle};
use crate::types::{ChangeId, MergeScenario};

/// Shape of the parent property a change lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Single,
    Array,
}

/// Parent link of a non-root change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub ours: Option<NodeHandle>,
    pub theirs: Option<NodeHandle>,
    pub property: String,
    pub container: ContainerKind,
}

/// Node handles recorded for one change.
#[derive(Debug, Clone)]
pub struct ChangeNodes {
    pub nodes: MergeScenario<Option<NodeHandle>>,
    pub parent: Option<ParentLink>,
    /// Resolved identity of the OURS node; the removal target.
    pub ours_id: Option<String>,
    /// Copy of the node to insert when OURS lacks it.
    pub source: Option<Node>,
}

impl ChangeNodes {
    pub fn parent_ours(&self) -> Option<NodeHandle> {
        self.parent.as_ref().and_then(|p| p.ours)
    }

    pub fn parent_theirs(&self) -> Option<NodeHandle> {
        self.parent.as_ref().and_then(|p| p.theirs)
    }

    pub fn parent_prop(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.property.as_str())
    }
}

/// Registry of one diff run. Valid only for the change tree produced by the
/// same run and dropped with it.
#[derive(Debug, Default)]
pub struct ChangeRegistry {
    entries: HashMap<ChangeId, ChangeNodes>,
}

impl ChangeRegistry {
    pub fn insert(&mut self, key: ChangeId, nodes: ChangeNodes) {
        self.entries.insert(key, nodes);
    }

    pub fn get(&self, key: ChangeId) -> Option<&ChangeNodes> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
