//! Tool registry and definitions.
//!
//! Provides the infrastructure for registering and dispatching MCP tools.

pub mod users;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::server::Sampler;
use crate::store::UserStore;

/// Display hints attached to a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolAnnotations {
    /// Human readable title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "create-user")
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
    /// Optional display hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_schema: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            annotations: None,
        }
    }

    /// Attach a display title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.annotations = Some(ToolAnnotations {
            title: Some(title.to_string()),
        });
        self
    }
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    /// Create a new registry with all tools registered.
    pub fn new() -> Self {
        let mut tools = Vec::new();
        tools.extend(users::tools());
        Self { tools }
    }

    /// Get all tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Dispatch a tool call to the appropriate handler.
    ///
    /// Returns a complete `tools/call` result. Handled failures are reported
    /// inside the result with `isError`; only unknown tools are errors here.
    pub fn dispatch(
        &self,
        store: &UserStore,
        sampler: &mut dyn Sampler,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<JsonValue> {
        if self.tools.iter().any(|t| t.name == name) {
            users::dispatch(store, sampler, name, args)
        } else {
            Err(McpError::UnknownTool(name.to_string()))
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper macro for creating JSON Schema for tool input parameters.
#[macro_export]
macro_rules! input_schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), $crate::input_schema!(@type $req_type));)*
        $(props.insert($opt_name.to_string(), $crate::input_schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only required properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), $crate::input_schema!(@type $req_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Empty object (no parameters)
    (object {}) => {{
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }};

    // Type mappings
    (@type string) => { serde_json::json!({"type": "string"}) };
    (@type email) => { serde_json::json!({"type": "string", "format": "email"}) };
    (@type integer) => { serde_json::json!({"type": "integer"}) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_macro_required_and_optional() {
        let schema = input_schema!(object {
            required: { "name": string, "email": email },
            optional: { "age": integer }
        });
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["email"]["format"], "email");
        assert_eq!(schema["properties"]["age"]["type"], "integer");
        assert_eq!(schema["required"], serde_json::json!(["name", "email"]));
    }

    #[test]
    fn test_schema_macro_empty() {
        let schema = input_schema!(object {});
        assert!(schema["properties"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_tool_def_serializes_annotations() {
        let def = ToolDef::new("t", "d", input_schema!(object {})).with_title("T");
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["annotations"]["title"], "T");
        assert!(json.get("inputSchema").is_some());

        let bare = serde_json::to_value(ToolDef::new("t", "d", input_schema!(object {}))).unwrap();
        assert!(bare.get("annotations").is_none());
    }
}
