use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scalar::Details;

/// A three-way merge scenario: base (common ancestor), ours (local), theirs (incoming).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeScenario<T> {
    pub base: T,
    pub ours: T,
    pub theirs: T,
}

impl<T> MergeScenario<T> {
    pub fn new(base: T, ours: T, theirs: T) -> Self {
        Self { base, ours, theirs }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> MergeScenario<U> {
        MergeScenario::new(f(self.base), f(self.ours), f(self.theirs))
    }
}

/// Sequential handle of a [`Change`] within one diff run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(pub u32);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Remove,
    Update,
    Rename,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Add => "add",
            ChangeKind::Remove => "remove",
            ChangeKind::Update => "update",
            ChangeKind::Rename => "rename",
        };
        f.write_str(s)
    }
}

/// One node of the merge difference tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub key: ChangeId,
    /// Identity of the node, or the property name for an array group.
    pub id: String,
    /// Type tag, or `Type.property` for an array group.
    pub node_kind: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
    pub conflicts: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Change>,
    pub label: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub group: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Change {
    pub fn find(&self, key: ChangeId) -> Option<&Change> {
        if self.key == key {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(key))
    }

    /// Pre-order walk over this change and its descendants.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Change)) {
        f(self);
        for c in &self.children {
            c.walk(f);
        }
    }

    /// Whether this change does something by itself, as opposed to only
    /// grouping descendants.
    pub fn is_effective(&self) -> bool {
        !self.group && (self.kind != ChangeKind::Update || self.details.is_some())
    }

    /// Number of effective changes in this subtree.
    pub fn count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |c| {
            if c.is_effective() {
                n += 1;
            }
        });
        n
    }

    /// Number of changes in this subtree with their own conflicting property.
    pub fn conflict_count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |c| {
            if c.details.as_ref().is_some_and(crate::scalar::has_conflicts) {
                n += 1;
            }
        });
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(key: u32, id: &str) -> Change {
        Change {
            key: ChangeId(key),
            id: id.into(),
            node_kind: "Attribute".into(),
            kind: ChangeKind::Add,
            details: None,
            conflicts: false,
            children: Vec::new(),
            label: id.into(),
            group: false,
        }
    }

    #[test]
    fn test_change_serializes_camel_case() {
        let mut group = leaf(0, "attributes");
        group.node_kind = "Entity.attributes".into();
        group.kind = ChangeKind::Update;
        group.group = true;
        group.children.push(leaf(1, "a2"));

        let v = serde_json::to_value(&group).unwrap();
        assert_eq!(v["nodeKind"], "Entity.attributes");
        assert_eq!(v["kind"], "update");
        assert_eq!(v["group"], true);
        assert!(v.get("details").is_none());
        assert!(v["children"][0].get("children").is_none());
        assert!(v["children"][0].get("group").is_none());

        let back: Change = serde_json::from_value(v).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn test_find_and_count() {
        let mut root = leaf(0, "root");
        root.kind = ChangeKind::Update;
        root.children.push(leaf(1, "a"));
        root.children.push(leaf(2, "b"));
        assert_eq!(root.find(ChangeId(2)).map(|c| c.id.as_str()), Some("b"));
        assert!(root.find(ChangeId(9)).is_none());
        assert_eq!(root.count(), 2);
        assert!(!root.is_effective());
        assert_eq!(root.conflict_count(), 0);
    }
}
