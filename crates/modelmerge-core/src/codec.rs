use modelmerge_engine::Node;

/// Converts document text to a node tree and back.
pub trait DocumentCodec: Send + Sync {
    /// Short name for logs ("json").
    fn name(&self) -> &str;

    fn parse(&self, text: &str) -> anyhow::Result<Node>;

    fn serialize(&self, node: &Node) -> anyhow::Result<String>;
}

/// JSON interchange: objects carrying `"$type"` are nodes, arrays of such
/// objects are child arrays, everything else is a scalar.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    pub pretty: bool,
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl DocumentCodec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn parse(&self, text: &str) -> anyhow::Result<Node> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Ok(Node::from_json(&value)?)
    }

    fn serialize(&self, node: &Node) -> anyhow::Result<String> {
        let value = node.to_json();
        let mut text = if self.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        text.push('\n');
        Ok(text)
    }
}
