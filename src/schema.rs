//! Tool input schema sanitizing for the text-generation provider.
//!
//! The provider rejects string `format` values it does not know, so every
//! tool schema is passed through [`sanitize`] before being declared.

use serde_json::{Map, Value as JsonValue};

/// String formats the provider accepts.
pub const ALLOWED_STRING_FORMATS: [&str; 2] = ["date-time", "enum"];

/// Return a copy of `node` with unsupported string formats removed.
///
/// Recurses into `properties` and `items`. Non-object input is returned as is.
pub fn sanitize(node: &JsonValue) -> JsonValue {
    let Some(obj) = node.as_object() else {
        return node.clone();
    };

    let mut out: Map<String, JsonValue> = obj.clone();

    if out.get("type").and_then(|t| t.as_str()) == Some("string") {
        let keep = match out.get("format") {
            Some(JsonValue::String(f)) => ALLOWED_STRING_FORMATS.contains(&f.as_str()),
            Some(_) => false,
            None => true,
        };
        if !keep {
            out.remove("format");
        }
    }

    if let Some(JsonValue::Object(props)) = out.get_mut("properties") {
        for value in props.values_mut() {
            *value = sanitize(value);
        }
    }

    if let Some(items) = out.get_mut("items") {
        *items = sanitize(items);
    }

    JsonValue::Object(out)
}
