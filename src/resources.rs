//! Read-only user resources.
//!
//! Resources: users://all
//! Templates: users://details/{userId}

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{McpError, Result};
use crate::store::UserStore;

const ALL_USERS_URI: &str = "users://all";
const USER_DETAILS_PREFIX: &str = "users://details/";

/// A concrete resource for the MCP resources/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Resource URI
    pub uri: String,
    /// Resource name
    pub name: String,
    /// Resource description
    pub description: String,
    /// Content type of the resource body
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A parameterized resource for the MCP resources/templates/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplateDef {
    /// RFC 6570 level 1 template, e.g. `users://details/{userId}`
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Template name
    pub name: String,
    /// Template description
    pub description: String,
    /// Content type of the resource body
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Get all concrete resources.
pub fn resources() -> Vec<ResourceDef> {
    vec![ResourceDef {
        uri: ALL_USERS_URI.to_string(),
        name: "users".to_string(),
        description: "Get all users data from the database".to_string(),
        mime_type: "application/json".to_string(),
    }]
}

/// Get all resource templates.
pub fn templates() -> Vec<ResourceTemplateDef> {
    vec![ResourceTemplateDef {
        uri_template: format!("{}{{userId}}", USER_DETAILS_PREFIX),
        name: "user-details".to_string(),
        description: "Get a user's details from the database".to_string(),
        mime_type: "application/json".to_string(),
    }]
}

/// Read a resource and return the MCP `resources/read` result.
pub fn read(store: &UserStore, uri: &str) -> Result<JsonValue> {
    let body = if uri == ALL_USERS_URI {
        serde_json::to_string_pretty(&store.list_users()?)?
    } else if let Some(raw_id) = uri.strip_prefix(USER_DETAILS_PREFIX) {
        let found = match raw_id.parse::<u64>() {
            Ok(id) => match store.get_user(id) {
                Ok(user) => Some(user),
                Err(McpError::NotFound(_)) => None,
                Err(e) => return Err(e),
            },
            Err(_) => None,
        };
        match found {
            Some(user) => serde_json::to_string_pretty(&user)?,
            None => serde_json::to_string_pretty(&serde_json::json!({ "error": "User not found" }))?,
        }
    } else {
        return Err(McpError::NotFound(format!("resource {}", uri)));
    };

    Ok(serde_json::json!({
        "contents": [{
            "uri": uri,
            "mimeType": "application/json",
            "text": body
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with_one() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(
            &path,
            json!([{"id": 1, "name": "A", "email": "a@a.io", "address": "x", "phone": "1"}]).to_string(),
        )
        .unwrap();
        (dir, UserStore::new(path))
    }

    fn body(result: &JsonValue) -> JsonValue {
        serde_json::from_str(result["contents"][0]["text"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn test_read_all() {
        let (_dir, store) = store_with_one();
        let result = read(&store, "users://all").unwrap();
        assert_eq!(body(&result).as_array().unwrap().len(), 1);
        assert_eq!(result["contents"][0]["uri"], "users://all");
    }

    #[test]
    fn test_read_details() {
        let (_dir, store) = store_with_one();
        assert_eq!(body(&read(&store, "users://details/1").unwrap())["name"], "A");
        assert_eq!(
            body(&read(&store, "users://details/2").unwrap()),
            json!({"error": "User not found"})
        );
        assert_eq!(
            body(&read(&store, "users://details/abc").unwrap()),
            json!({"error": "User not found"})
        );
    }

    #[test]
    fn test_read_unknown_uri() {
        let (_dir, store) = store_with_one();
        assert!(matches!(read(&store, "users://nope"), Err(McpError::NotFound(_))));
    }

    #[test]
    fn test_template_uri() {
        assert_eq!(templates()[0].uri_template, "users://details/{userId}");
    }
}
