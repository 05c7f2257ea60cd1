//! Prompt templates.
//!
//! Prompts: generate-fake-user

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_string_arg, text_content};
use crate::error::{McpError, Result};

/// A prompt argument descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Argument description
    pub description: String,
    /// Whether the argument must be supplied
    pub required: bool,
}

/// A prompt definition for the MCP prompts/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDef {
    /// Prompt name
    pub name: String,
    /// Prompt description
    pub description: String,
    /// Arguments the prompt accepts
    pub arguments: Vec<PromptArgument>,
}

/// Get all prompt definitions.
pub fn prompts() -> Vec<PromptDef> {
    vec![PromptDef {
        name: "generate-fake-user".to_string(),
        description: "Generate a fake user based on a given name".to_string(),
        arguments: vec![PromptArgument {
            name: "name".to_string(),
            description: "Name of the user to generate".to_string(),
            required: true,
        }],
    }]
}

/// Render a prompt and return the MCP `prompts/get` result.
pub fn get(name: &str, args: &Map<String, JsonValue>) -> Result<JsonValue> {
    match name {
        "generate-fake-user" => {
            let user_name = get_string_arg(args, "name")?;
            Ok(serde_json::json!({
                "messages": [{
                    "role": "user",
                    "content": text_content(format!(
                        "Generate a fake user with the name {}. The user should have a realistic \
                         email, address, and phone number.",
                        user_name
                    ))
                }]
            }))
        }
        _ => Err(McpError::NotFound(format!("prompt {}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_fake_user() {
        let args = json!({"name": "Grace"});
        let result = get("generate-fake-user", args.as_object().unwrap()).unwrap();
        let messages = result["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert!(messages[0]["content"]["text"].as_str().unwrap().contains("Grace"));
    }

    #[test]
    fn test_missing_argument() {
        let err = get("generate-fake-user", &Map::new()).unwrap_err();
        assert!(matches!(err, McpError::MissingArg(_)));
    }

    #[test]
    fn test_unknown_prompt() {
        assert!(matches!(get("nope", &Map::new()), Err(McpError::NotFound(_))));
    }
}
