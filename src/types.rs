//! MCP domain record types: tools, content, capabilities, implementation info.
//! These are the "pure schema" records the wire protocol carries in `params`
//! and `result`, kept intentionally thin and matching only the fields this
//! core actually reads or produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A named, schema-described operation callable via `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub property_type: String,
}

/// A tool definition as returned by the upstream pipeline, before conversion
/// into a `Tool`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<PipelineParamDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineParamDef {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(default)]
    pub required: bool,
}

/// Content polymorphism: a tagged variant keyed by `type` in the JSON
/// representation. Only `text` is produced by this core today.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
    Image { data: String, mime_type: String },
    Resource { uri: String, text: Option<String> },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Rejects `None`/empty content outright, the inverse of rejecting only
    /// when content is non-null.
    pub fn new(content: Vec<Content>) -> Result<Self, &'static str> {
        if content.is_empty() {
            return Err("CallToolResult requires at least one content entry");
        }
        Ok(Self {
            content,
            is_error: false,
        })
    }

    pub fn error(content: Vec<Content>) -> Result<Self, &'static str> {
        let mut result = Self::new(content)?;
        result.is_error = true;
        Ok(result)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientCapabilities {
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerCapabilities {
    pub tools: Option<ToolsCapability>,
    pub logging: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsCapability {
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Root {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tool_result_rejects_empty_content() {
        assert!(CallToolResult::new(vec![]).is_err());
    }

    #[test]
    fn call_tool_result_accepts_text_content() {
        let result = CallToolResult::new(vec![Content::text("hi")]).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn content_serializes_with_type_tag() {
        let value = serde_json::to_value(Content::text("hi")).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "hi");
    }
}
