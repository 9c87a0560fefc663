/// Tool Output Content
///
/// The transport-independent result of a tool invocation: an ordered list of
/// typed content blocks, serialized as the `result` of a `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Resource { resource: EmbeddedResource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Append a JSON document as an embedded `application/json` resource.
    pub fn with_json(mut self, uri: impl Into<String>, value: &Value) -> Self {
        self.content.push(ContentBlock::Resource {
            resource: EmbeddedResource {
                uri: uri.into(),
                mime_type: "application/json".to_string(),
                text: value.to_string(),
            },
        });
        self
    }

    /// Concatenated text of all text blocks, for logs and tests.
    pub fn plain_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Resource { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
