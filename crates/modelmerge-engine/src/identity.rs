//! Stable node identities used to correlate revisions and array reorderings.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::hints::Hints;
use crate::node::{Node, NodeHandle};
use crate::reflect::scalar_names;

/// Resolves and caches node identities for one diff run.
///
/// Ids are memoized per [`NodeHandle`], so asking twice for the same node
/// instance returns the same id even when a synthetic counter was involved.
/// Two structurally identical nodes still get distinct synthetic ids.
#[derive(Debug)]
pub struct IdentityResolver {
    hints: Hints,
    cache: RefCell<HashMap<NodeHandle, String>>,
    counters: RefCell<HashMap<String, usize>>,
}

impl IdentityResolver {
    pub fn new(hints: Hints) -> Self {
        Self {
            hints,
            cache: RefCell::new(HashMap::new()),
            counters: RefCell::new(HashMap::new()),
        }
    }

    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    /// Resolve the id of `node`. First match wins:
    /// the hinted key property, an id-like property, the first string scalar
    /// (as `Type:value`), then a synthetic `Type:[values]#n`.
    pub fn resolve(&self, node: &Node) -> String {
        if let Some(id) = self.cache.borrow().get(&node.handle()) {
            return id.clone();
        }
        let id = self
            .declared_id(node)
            .unwrap_or_else(|| self.synthetic_id(node));
        self.cache.borrow_mut().insert(node.handle(), id.clone());
        id
    }

    /// Cached id, if this node was resolved before.
    pub fn cached(&self, handle: NodeHandle) -> Option<String> {
        self.cache.borrow().get(&handle).cloned()
    }

    fn declared_id(&self, node: &Node) -> Option<String> {
        if let Some(key) = self.hints.key_prop(node.kind()) {
            if let Some(v) = non_empty_str(node, key) {
                return Some(v.to_string());
            }
        }
        for prop in &self.hints.id_props {
            if let Some(v) = non_empty_str(node, prop) {
                return Some(v.to_string());
            }
        }
        let hidden = self.hints.hidden_props(node.kind());
        scalar_names(node, hidden)
            .find_map(|name| non_empty_str(node, name))
            .map(|v| format!("{}:{}", node.kind(), v))
    }

    fn synthetic_id(&self, node: &Node) -> String {
        let hidden = self.hints.hidden_props(node.kind());
        let values: Vec<Value> = scalar_names(node, hidden)
            .filter_map(|name| node.scalar(name).cloned())
            .collect();
        let base_key = format!("{}:{}", node.kind(), Value::Array(values));
        let mut counters = self.counters.borrow_mut();
        let n = counters.entry(base_key.clone()).or_insert(0);
        let id = format!("{base_key}#{n}");
        *n += 1;
        id
    }

    /// The key or id-like property that names `node`, if one does.
    pub fn identity_prop(&self, node: &Node) -> Option<&str> {
        if let Some(key) = self.hints.key_prop(node.kind()) {
            if non_empty_str(node, key).is_some() {
                return Some(key);
            }
        }
        self.hints
            .id_props
            .iter()
            .map(String::as_str)
            .find(|p| non_empty_str(node, p).is_some())
    }

    /// Whether renaming `prop` changes a node's identity. Used to tell a
    /// rename from a plain update.
    pub fn is_identity_prop(&self, kind: &str, prop: &str) -> bool {
        self.hints.key_prop(kind) == Some(prop) || self.hints.id_props.iter().any(|p| p == prop)
    }

    /// Structural fingerprint: type tag plus sorted non-identity scalars.
    pub fn signature(&self, node: &Node) -> String {
        let hidden = self.hints.hidden_props(node.kind());
        let mut names: Vec<&str> = scalar_names(node, hidden)
            .filter(|name| !self.is_identity_prop(node.kind(), name))
            .collect();
        names.sort_unstable();
        let mut sig = node.kind().to_string();
        for name in names {
            if let Some(v) = node.scalar(name) {
                sig.push('|');
                sig.push_str(name);
                sig.push('=');
                sig.push_str(&v.to_string());
            }
        }
        sig
    }
}

fn non_empty_str<'a>(node: &'a Node, prop: &str) -> Option<&'a str> {
    node.str_prop(prop).filter(|s| !s.is_empty())
}
