//! User directory tools.
//!
//! Tools: create-user, create-random-user

use serde_json::{Map, Value as JsonValue};

use crate::convert::{strip_code_fence, tool_result};
use crate::error::{McpError, Result};
use crate::input_schema;
use crate::server::Sampler;
use crate::store::UserStore;
use crate::tools::ToolDef;

const RANDOM_USER_PROMPT: &str = "Generate fake user data. The user should have a realistic \
     name, email, address, and phone number. Return only a JSON object with the keys name, \
     email, address, and phone, with no other text or formatting, so it can be parsed directly.";

/// Get all user tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            "create-user",
            "Create a new user in the database",
            input_schema!(object {
                required: { "name": string, "email": email, "address": string, "phone": string }
            }),
        )
        .with_title("Create User"),
        ToolDef::new(
            "create-random-user",
            "Create a random user with fake data",
            input_schema!(object {}),
        )
        .with_title("Create Random User"),
    ]
}

/// Dispatch a user tool call.
pub fn dispatch(
    store: &UserStore,
    sampler: &mut dyn Sampler,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<JsonValue> {
    match name {
        "create-user" => Ok(match store.create_user(&args) {
            Ok(id) => tool_result(format!("User created with id {}", id), false),
            Err(e) => failure("Failed to save user", e),
        }),

        "create-random-user" => Ok(match random_user(store, sampler) {
            Ok(id) => tool_result(format!("Random user created with id {}", id), false),
            Err(e @ (McpError::Validation(_) | McpError::StoreRead { .. } | McpError::StoreWrite { .. })) => {
                failure("Failed to save user", e)
            }
            Err(e) => failure("Failed to generate user data", e),
        }),

        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}

fn failure(context: &str, err: McpError) -> JsonValue {
    tracing::warn!(error = %err, "{}", context);
    tool_result(format!("{}: {}", context, err), true)
}

fn random_user(store: &UserStore, sampler: &mut dyn Sampler) -> Result<u64> {
    let response = sampler.create_message(serde_json::json!({
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": RANDOM_USER_PROMPT }
        }],
        "maxTokens": 1024
    }))?;

    let content = response
        .get("content")
        .ok_or_else(|| McpError::Protocol("sampling result has no content".to_string()))?;
    if content.get("type").and_then(|t| t.as_str()) != Some("text") {
        return Err(McpError::Protocol(
            "sampling result is not text content".to_string(),
        ));
    }
    let text = content
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or_default();

    let candidate: Map<String, JsonValue> = serde_json::from_str(strip_code_fence(text))?;
    store.create_user(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Canned(JsonValue);

    impl Sampler for Canned {
        fn create_message(&mut self, params: JsonValue) -> Result<JsonValue> {
            assert_eq!(params["messages"][0]["content"]["type"], "text");
            Ok(self.0.clone())
        }
    }

    fn empty_store() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "[]").unwrap();
        (dir, UserStore::new(path))
    }

    fn text_of(result: &JsonValue) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[test]
    fn test_random_user_from_fenced_output() {
        let (_dir, store) = empty_store();
        let mut sampler = Canned(json!({
            "role": "assistant",
            "content": {
                "type": "text",
                "text": "```json\n{\"name\":\"Bo\",\"email\":\"bo@example.org\",\"address\":\"2 Elm\",\"phone\":\"123\"}\n```"
            }
        }));
        let result = dispatch(&store, &mut sampler, "create-random-user", Map::new()).unwrap();
        assert_eq!(text_of(&result), "Random user created with id 1");
        assert_eq!(store.get_user(1).unwrap().name, "Bo");
    }

    #[test]
    fn test_random_user_non_text_content() {
        let (_dir, store) = empty_store();
        let mut sampler = Canned(json!({"content": {"type": "image", "data": "AA=="}}));
        let result = dispatch(&store, &mut sampler, "create-random-user", Map::new()).unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(text_of(&result).starts_with("Failed to generate user data"));
    }

    #[test]
    fn test_random_user_unparsable_output() {
        let (_dir, store) = empty_store();
        let mut sampler = Canned(json!({"content": {"type": "text", "text": "Sure! Here you go"}}));
        let result = dispatch(&store, &mut sampler, "create-random-user", Map::new()).unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(store.list_users().unwrap().is_empty());
    }

    #[test]
    fn test_create_user_validation_text() {
        let (_dir, store) = empty_store();
        let mut sampler = Canned(json!(null));
        let args = json!({"name": "x", "email": "nope", "address": "a", "phone": "p"});
        let result = dispatch(
            &store,
            &mut sampler,
            "create-user",
            args.as_object().unwrap().clone(),
        )
        .unwrap();
        assert_eq!(result["isError"], json!(true));
        assert!(text_of(&result).contains("email"));
    }
}
