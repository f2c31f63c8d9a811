//! Per-type merge hints: identity property, hidden properties, display label.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::Node;

/// Setup errors in a hint table. These are fatal at load time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HintError {
    #[error("hint for type \"{kind}\": keyProp \"{prop}\" is also listed in hiddenProps")]
    HiddenKeyProp { kind: String, prop: String },
    #[error("hint registered under an empty type tag")]
    EmptyTypeTag,
    #[error("idProps contains an empty property name")]
    EmptyIdProp,
}

/// Hint for one type tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    /// Property whose string value is the node's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prop: Option<String>,
    /// Properties excluded from reflection and the scalar diff.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_props: Vec<String>,
    /// Label template; `{prop}` placeholders are filled from scalar values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Hint {
    pub fn keyed(prop: impl Into<String>) -> Self {
        Self {
            key_prop: Some(prop.into()),
            ..Self::default()
        }
    }

    pub fn with_hidden(mut self, props: &[&str]) -> Self {
        self.hidden_props = props.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_label(mut self, template: impl Into<String>) -> Self {
        self.label = Some(template.into());
        self
    }
}

/// The full hint table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hints {
    /// Id-like property names, tried in order.
    #[serde(default = "default_id_props")]
    pub id_props: Vec<String>,
    #[serde(default)]
    pub types: BTreeMap<String, Hint>,
}

fn default_id_props() -> Vec<String> {
    vec!["id".into(), "name".into()]
}

impl Default for Hints {
    fn default() -> Self {
        Self {
            id_props: default_id_props(),
            types: BTreeMap::new(),
        }
    }
}

impl Hints {
    pub fn with_type(mut self, kind: impl Into<String>, hint: Hint) -> Self {
        self.types.insert(kind.into(), hint);
        self
    }

    pub fn validate(&self) -> Result<(), HintError> {
        if self.id_props.iter().any(|p| p.is_empty()) {
            return Err(HintError::EmptyIdProp);
        }
        for (kind, hint) in &self.types {
            if kind.is_empty() {
                return Err(HintError::EmptyTypeTag);
            }
            if let Some(key) = &hint.key_prop {
                if hint.hidden_props.iter().any(|h| h == key) {
                    return Err(HintError::HiddenKeyProp {
                        kind: kind.clone(),
                        prop: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&Hint> {
        self.types.get(kind)
    }

    pub fn key_prop(&self, kind: &str) -> Option<&str> {
        self.get(kind)?.key_prop.as_deref()
    }

    pub fn hidden_props(&self, kind: &str) -> &[String] {
        self.get(kind).map(|h| h.hidden_props.as_slice()).unwrap_or(&[])
    }

    pub fn is_hidden(&self, kind: &str, prop: &str) -> bool {
        self.hidden_props(kind).iter().any(|h| h == prop)
    }

    /// Render the label template for `node`, if its type has one.
    /// Placeholders naming a missing property render as empty text.
    pub fn label_for(&self, node: &Node) -> Option<String> {
        let template = self.get(node.kind())?.label.as_deref()?;
        Some(render_label(template, node))
    }
}

fn render_label(template: &str, node: &Node) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                if let Some(v) = node.scalar(name) {
                    match v {
                        serde_json::Value::String(s) => out.push_str(s),
                        serde_json::Value::Null => {}
                        other => out.push_str(&other.to_string()),
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_template() {
        let hints = Hints::default().with_type("Attribute", Hint::default().with_label("{name} : {type}"));
        let node = Node::new("Attribute")
            .with_scalar("name", "id")
            .with_scalar("type", "int");
        assert_eq!(hints.label_for(&node).as_deref(), Some("id : int"));

        let partial = Node::new("Attribute").with_scalar("name", "id");
        assert_eq!(hints.label_for(&partial).as_deref(), Some("id : "));
        assert_eq!(hints.label_for(&Node::new("Other")), None);
    }

    #[test]
    fn test_label_renders_numbers_and_unclosed_braces() {
        let hints = Hints::default().with_type("Col", Hint::default().with_label("{name}({len}) {oops"));
        let node = Node::new("Col").with_scalar("name", "c").with_scalar("len", 12);
        assert_eq!(hints.label_for(&node).as_deref(), Some("c(12) {oops"));
    }

    #[test]
    fn test_validate_rejects_hidden_key_prop() {
        let hints = Hints::default().with_type("Entity", Hint::keyed("name").with_hidden(&["name"]));
        assert_eq!(
            hints.validate(),
            Err(HintError::HiddenKeyProp {
                kind: "Entity".into(),
                prop: "name".into()
            })
        );
        let empty = Hints::default().with_type("", Hint::default());
        assert_eq!(empty.validate(), Err(HintError::EmptyTypeTag));
        assert!(Hints::default().validate().is_ok());
    }

    #[test]
    fn test_deserialize_defaults() {
        let hints: Hints = serde_json::from_str(
            r#"{"types": {"Entity": {"keyProp": "name", "hiddenProps": ["layout"]}}}"#,
        )
        .unwrap();
        assert_eq!(hints.id_props, vec!["id", "name"]);
        assert_eq!(hints.key_prop("Entity"), Some("name"));
        assert!(hints.is_hidden("Entity", "layout"));
        assert!(!hints.is_hidden("Relation", "layout"));
    }
}
