//! Conversion helpers between JSON arguments and MCP content payloads.

use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};

/// Build a single MCP text content item.
pub fn text_content(text: impl Into<String>) -> JsonValue {
    serde_json::json!({ "type": "text", "text": text.into() })
}

/// Wrap a text line into an MCP `tools/call` result.
pub fn tool_result(text: impl Into<String>, is_error: bool) -> JsonValue {
    let mut result = serde_json::json!({ "content": [text_content(text)] });
    if is_error {
        result["isError"] = JsonValue::Bool(true);
    }
    result
}

/// Extract the text of the first text item in an MCP `content` array.
pub fn first_text(content: &[JsonValue]) -> Option<&str> {
    content
        .iter()
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some("text"))
        .and_then(|c| c.get("text"))
        .and_then(|t| t.as_str())
}

/// Strip surrounding Markdown code fences from model output.
///
/// Handles `` ```json `` and bare `` ``` `` markers by trimming, nothing more.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Helper to get a required string argument from JSON arguments.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| McpError::MissingArg(name.to_string()))
}

/// Helper to get a required object argument from JSON parameters.
pub fn get_object_arg<'a>(
    args: &'a Map<String, JsonValue>,
    name: &str,
) -> Result<&'a Map<String, JsonValue>> {
    match args.get(name) {
        Some(JsonValue::Object(obj)) => Ok(obj),
        Some(_) => Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: "Expected an object".to_string(),
        }),
        None => Err(McpError::MissingArg(name.to_string())),
    }
}

/// Coerce operator-typed text into the JSON type a schema property declares.
///
/// Unknown or string types, and values that do not parse, stay strings.
pub fn coerce_input(raw: &str, property: &JsonValue) -> JsonValue {
    let ty = property.get("type").and_then(|t| t.as_str()).unwrap_or("string");
    match ty {
        "integer" => raw
            .trim()
            .parse::<i64>()
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(raw.to_string())),
        "number" => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(raw.to_string())),
        "boolean" => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" => JsonValue::Bool(true),
            "false" | "no" | "n" => JsonValue::Bool(false),
            _ => JsonValue::String(raw.to_string()),
        },
        _ => JsonValue::String(raw.to_string()),
    }
}
