//! JSON file backed user store.
//!
//! The whole array is read on every access and rewritten on every creation.
//! Writes go to a temporary sibling file which is renamed over the original.
//! Records are read leniently so hand-edited files still load, and existing
//! records are written back exactly as they were found.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};

/// Fields a candidate user must carry, in schema order.
pub const USER_FIELDS: [&str; 4] = ["name", "email", "address", "phone"];

/// A persisted user record.
///
/// Missing fields read as empty and scalar fields of another type read as
/// their JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Sequential identifier, one plus the store length at creation time
    pub id: u64,
    /// Display name
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    /// Email address
    #[serde(deserialize_with = "lenient_string")]
    pub email: String,
    /// Postal address
    #[serde(deserialize_with = "lenient_string")]
    pub address: String,
    /// Phone number
    #[serde(deserialize_with = "lenient_string")]
    pub phone: String,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => s,
        JsonValue::Null => String::new(),
        other => other.to_string(),
    })
}

/// A validated user record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Postal address
    pub address: String,
    /// Phone number
    pub phone: String,
}

impl NewUser {
    /// Validate an arbitrary JSON object against the user schema.
    ///
    /// All four fields must be strings, `email` must look like an address,
    /// and no other keys are allowed. Every problem is reported.
    pub fn validate(candidate: &Map<String, JsonValue>) -> Result<Self> {
        let mut errors = Vec::new();
        let mut fields: [String; 4] = Default::default();

        for (slot, field) in fields.iter_mut().zip(USER_FIELDS) {
            match candidate.get(field) {
                Some(JsonValue::String(s)) => *slot = s.clone(),
                Some(_) => errors.push(format!("{}: Expected string", field)),
                None => errors.push(format!("{}: Required", field)),
            }
        }

        if candidate.get("email").is_some_and(|v| v.is_string()) && !is_valid_email(&fields[1]) {
            errors.push("email: Invalid email".to_string());
        }

        for key in candidate.keys() {
            if !USER_FIELDS.contains(&key.as_str()) {
                errors.push(format!("{}: Unrecognized key", key));
            }
        }

        if !errors.is_empty() {
            return Err(McpError::Validation(errors));
        }

        let [name, email, address, phone] = fields;
        Ok(Self {
            name,
            email,
            address,
            phone,
        })
    }

    fn with_id(self, id: u64) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            address: self.address,
            phone: self.phone,
        }
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .expect("valid email regex")
});

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Handle to the backing JSON array file.
#[derive(Debug, Clone)]
pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    /// Create a store over the given file. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every user from disk.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.read_records()?
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(|e| self.read_error(e)))
            .collect()
    }

    /// Find a user by exact id.
    pub fn get_user(&self, id: u64) -> Result<User> {
        self.list_users()?
            .into_iter()
            .find(|u| u.id == id)
            .ok_or_else(|| McpError::NotFound(format!("user {}", id)))
    }

    /// Validate and append a user, then rewrite the file. Returns the new id.
    pub fn create_user(&self, candidate: &Map<String, JsonValue>) -> Result<u64> {
        let new_user = NewUser::validate(candidate)?;
        let mut records = self.read_records()?;
        let id = records.len() as u64 + 1;
        let record = serde_json::to_value(new_user.with_id(id)).map_err(|e| self.write_error(e))?;
        records.push(record);

        if let Err(e) = self.persist(&records) {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to persist user store");
            return Err(e);
        }

        tracing::debug!(id, "Created user");
        Ok(id)
    }

    /// Raw records, unchanged from the file.
    fn read_records(&self) -> Result<Vec<JsonValue>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| self.read_error(e))?;
        serde_json::from_str(&raw).map_err(|e| self.read_error(e))
    }

    fn persist(&self, records: &[JsonValue]) -> Result<()> {
        let body = serde_json::to_string_pretty(records).map_err(|e| self.write_error(e))?;
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.write_error(e))?;
        tmp.write_all(body.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| self.write_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_error(e.error))?;
        Ok(())
    }

    fn read_error(&self, err: impl std::fmt::Display) -> McpError {
        McpError::StoreRead {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }

    fn write_error(&self, err: impl std::fmt::Display) -> McpError {
        McpError::StoreWrite {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(value: JsonValue) -> Map<String, JsonValue> {
        match value {
            JsonValue::Object(m) => m,
            _ => panic!("candidate must be an object"),
        }
    }

    fn seeded_store(users: JsonValue) -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, serde_json::to_string_pretty(&users).unwrap()).unwrap();
        (dir, UserStore::new(path))
    }

    fn valid() -> Map<String, JsonValue> {
        candidate(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "address": "1 Loop Rd",
            "phone": "555-0100"
        }))
    }

    #[test]
    fn test_validate_accepts_complete_candidate() {
        let user = NewUser::validate(&valid()).unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.email, "ada@example.com");
    }

    #[test]
    fn test_validate_rejects_bad_email() {
        let err = NewUser::validate(&candidate(json!({
            "name": "x", "email": "not-an-email", "address": "a", "phone": "p"
        })))
        .unwrap_err();
        match err {
            McpError::Validation(msgs) => {
                assert_eq!(msgs.len(), 1);
                assert!(msgs[0].starts_with("email"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_extra_field() {
        let err = NewUser::validate(&candidate(json!({
            "name": "x", "email": "a@b.com", "address": "a", "phone": "p", "extra": "z"
        })))
        .unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let err = NewUser::validate(&candidate(json!({"name": 7, "email": "bad"}))).unwrap_err();
        match err {
            McpError::Validation(msgs) => {
                assert_eq!(msgs.len(), 4, "{:?}", msgs);
                assert!(msgs.iter().any(|m| m == "name: Expected string"));
                assert!(msgs.iter().any(|m| m == "address: Required"));
                assert!(msgs.iter().any(|m| m == "phone: Required"));
                assert!(msgs.iter().any(|m| m == "email: Invalid email"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_list_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.list_users(), Err(McpError::StoreRead { .. })));
    }

    #[test]
    fn test_list_non_array_is_read_error() {
        let (_dir, store) = seeded_store(json!({"users": []}));
        assert!(matches!(store.list_users(), Err(McpError::StoreRead { .. })));
    }

    #[test]
    fn test_create_assigns_length_plus_one() {
        let (_dir, store) = seeded_store(json!([
            {"id": 1, "name": "A", "email": "a@a.io", "address": "x", "phone": "1"}
        ]));
        let first = store.create_user(&valid()).unwrap();
        let second = store.create_user(&valid()).unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, 3);

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 3);
        assert_eq!(store.get_user(3).unwrap().name, "Ada");
    }

    #[test]
    fn test_create_writes_indented_json() {
        let (_dir, store) = seeded_store(json!([]));
        store.create_user(&valid()).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  {"));
    }

    #[test]
    fn test_invalid_candidate_leaves_file_untouched() {
        let (_dir, store) = seeded_store(json!([]));
        let before = std::fs::read_to_string(store.path()).unwrap();
        let mut bad = valid();
        bad.insert("extra".to_string(), json!("z"));
        assert!(store.create_user(&bad).is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_hand_edited_records_load() {
        let (_dir, store) = seeded_store(json!([
            {"id": 1, "name": "A", "email": "a@a.io", "address": "x", "phone": 5550100},
            {"id": 2, "name": "B", "email": "b@b.io", "nickname": "bee"}
        ]));
        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].phone, "5550100");
        assert_eq!(users[1].address, "");
        assert_eq!(users[1].phone, "");
    }

    #[test]
    fn test_non_object_record_is_read_error() {
        let (_dir, store) = seeded_store(json!([{"id": 1, "name": "A"}, 42]));
        assert!(matches!(store.list_users(), Err(McpError::StoreRead { .. })));
    }

    #[test]
    fn test_create_keeps_existing_records_verbatim() {
        let (_dir, store) = seeded_store(json!([
            {"id": 1, "name": "B", "email": "b@b.io", "nickname": "bee", "phone": 7}
        ]));
        assert_eq!(store.create_user(&valid()).unwrap(), 2);

        let raw: JsonValue =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["nickname"], "bee");
        assert_eq!(raw[0]["phone"], 7);
        assert_eq!(raw[1]["name"], "Ada");
        assert_eq!(raw[1]["id"], 2);
    }

    // The fd link reads through to the file, but its parent directory
    // accepts no new entries, so the temp file cannot be created.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_create_write_failure_leaves_file() {
        use std::os::unix::io::AsRawFd;

        let (_dir, seeded) = seeded_store(json!([
            {"id": 1, "name": "A", "email": "a@a.io", "address": "x", "phone": "1"}
        ]));
        let before = std::fs::read_to_string(seeded.path()).unwrap();
        let file = std::fs::File::open(seeded.path()).unwrap();
        let store = UserStore::new(format!("/proc/self/fd/{}", file.as_raw_fd()));
        assert_eq!(store.list_users().unwrap().len(), 1);

        let result = store.create_user(&valid());
        assert!(matches!(result, Err(McpError::StoreWrite { .. })), "{:?}", result);
        assert_eq!(std::fs::read_to_string(seeded.path()).unwrap(), before);
        assert_eq!(seeded.list_users().unwrap().len(), 1);
        drop(file);
    }

    #[test]
    fn test_get_unknown_user() {
        let (_dir, store) = seeded_store(json!([]));
        assert!(matches!(store.get_user(9), Err(McpError::NotFound(_))));
    }
}
