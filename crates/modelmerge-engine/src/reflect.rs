//! Classify a node's own properties into scalars, single children and child arrays.

use crate::hints::Hints;
use crate::node::{is_reserved, Node, Prop};

/// Property names of one node, grouped by shape, in declaration order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reflection {
    pub scalars: Vec<String>,
    pub singletons: Vec<String>,
    pub arrays: Vec<String>,
}

/// Reserved and hidden properties are skipped. An empty child array is
/// neither a scalar nor an array group.
pub fn reflect(node: &Node, hints: &Hints) -> Reflection {
    let hidden = hints.hidden_props(node.kind());
    let mut out = Reflection::default();
    for (name, prop) in node.props() {
        if is_reserved(name) || hidden.iter().any(|h| h == name) {
            continue;
        }
        match prop {
            Prop::Scalar(_) => out.scalars.push(name.to_string()),
            Prop::Child(_) => out.singletons.push(name.to_string()),
            Prop::Children(items) if !items.is_empty() => out.arrays.push(name.to_string()),
            Prop::Children(_) => {}
        }
    }
    out
}

/// Names of scalar properties the diff looks at.
pub fn scalar_names<'a>(node: &'a Node, hidden: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
    node.props().filter_map(move |(name, prop)| match prop {
        Prop::Scalar(_) if !is_reserved(name) && !hidden.iter().any(|h| h == name) => Some(name),
        _ => None,
    })
}
