//! Per-property three-way deltas over scalar values.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::Node;
use crate::reflect::scalar_names;

/// One property's value on each side. `None` means the node or the
/// property is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropDelta {
    pub base: Option<Value>,
    pub ours: Option<Value>,
    pub theirs: Option<Value>,
}

impl PropDelta {
    pub fn ours_changed(&self) -> bool {
        self.ours != self.base
    }

    pub fn theirs_changed(&self) -> bool {
        self.theirs != self.base
    }

    /// Both sides changed the value, to different results.
    pub fn is_conflict(&self) -> bool {
        self.ours_changed() && self.theirs_changed() && self.ours != self.theirs
    }
}

/// Property name → delta, in first-seen order.
pub type Details = IndexMap<String, PropDelta>;

/// Deltas for every scalar property that differs between the present nodes.
pub fn diff_scalar_props(
    base: Option<&Node>,
    ours: Option<&Node>,
    theirs: Option<&Node>,
    hidden: &[String],
) -> Details {
    let mut names: Vec<&str> = Vec::new();
    for node in [base, ours, theirs].into_iter().flatten() {
        for name in scalar_names(node, hidden) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    let read = |node: Option<&Node>, name: &str| node.and_then(|n| n.scalar(name)).cloned();
    let mut details = Details::new();
    for name in names {
        let delta = PropDelta {
            base: read(base, name),
            ours: read(ours, name),
            theirs: read(theirs, name),
        };
        if delta.ours_changed() || delta.theirs_changed() {
            details.insert(name.to_string(), delta);
        }
    }
    details
}

pub fn has_conflicts(details: &Details) -> bool {
    details.values().any(PropDelta::is_conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn entity(name: &str) -> Node {
        Node::new("Entity").with_scalar("name", name)
    }

    #[test]
    fn test_unchanged_props_are_omitted() {
        let base = entity("A").with_scalar("abstract", false);
        let ours = entity("B").with_scalar("abstract", false);
        let theirs = entity("A").with_scalar("abstract", false);
        let details = diff_scalar_props(Some(&base), Some(&ours), Some(&theirs), &[]);
        assert_eq!(details.len(), 1);
        let d = &details["name"];
        assert_eq!(d.base, Some(json!("A")));
        assert_eq!(d.ours, Some(json!("B")));
        assert_eq!(d.theirs, Some(json!("A")));
        assert!(!has_conflicts(&details));
    }

    #[test]
    fn test_absent_node_reads_as_absent_values() {
        let theirs = entity("New").with_scalar("abstract", true);
        let details = diff_scalar_props(None, None, Some(&theirs), &[]);
        assert_eq!(details.len(), 2);
        assert_eq!(details["abstract"].base, None);
        assert!(!has_conflicts(&details));
    }

    #[test]
    fn test_conflict_requires_divergent_edits() {
        let base = entity("A");
        let both_same = diff_scalar_props(Some(&base), Some(&entity("B")), Some(&entity("B")), &[]);
        assert!(!has_conflicts(&both_same));
        let divergent = diff_scalar_props(Some(&base), Some(&entity("B")), Some(&entity("C")), &[]);
        assert!(has_conflicts(&divergent));
    }

    #[test]
    fn test_hidden_props_are_skipped() {
        let base = entity("A").with_scalar("x", 1);
        let ours = entity("A").with_scalar("x", 2);
        let hidden = vec!["x".to_string()];
        assert!(diff_scalar_props(Some(&base), Some(&ours), Some(&base), &hidden).is_empty());
    }

    fn side() -> impl Strategy<Value = Option<i64>> {
        prop_oneof![Just(None), (0i64..3).prop_map(Some)]
    }

    fn node_with(v: Option<i64>) -> Node {
        let n = Node::new("T");
        match v {
            Some(v) => n.with_scalar("p", v),
            None => n,
        }
    }

    proptest! {
        #[test]
        fn prop_details_and_conflicts_match_definition(b in side(), o in side(), t in side()) {
            let (base, ours, theirs) = (node_with(b), node_with(o), node_with(t));
            let details = diff_scalar_props(Some(&base), Some(&ours), Some(&theirs), &[]);
            prop_assert_eq!(details.contains_key("p"), o != b || t != b);
            prop_assert_eq!(has_conflicts(&details), o != b && t != b && o != t);
        }
    }
}
