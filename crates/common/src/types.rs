//! Core types for the user search domain

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{Error, Result};

/// How many of the returned identities are considered when checking the UI
pub const CANDIDATE_LIMIT: usize = 5;

/// A username submitted to the search box
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SearchQuery(String);

impl SearchQuery {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(Error::InvalidQuery(
                "search query must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased form used for case-insensitive comparisons
    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }
}

impl TryFrom<String> for SearchQuery {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SearchQuery> for String {
    fn from(query: SearchQuery) -> Self {
        query.0
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user as returned by the REST API. Only `login` is relied upon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub login: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Followers are plain identities
pub type Follower = Identity;

/// A repository entry from `GET /users/<username>/repos`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub owner: Identity,
    #[serde(default)]
    pub fork: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `GET /search/users`.
///
/// Items are kept as raw JSON so that malformed entries (nulls, objects
/// without a login) survive parsing and are filtered when candidates are
/// derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultPayload {
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub incomplete_results: Option<bool>,
    pub items: Vec<Value>,
}

impl SearchResultPayload {
    /// Validate the shape of a parsed body. `items` must be present and be an array.
    pub fn from_value(value: Value) -> std::result::Result<Self, String> {
        let Value::Object(mut object) = value else {
            return Err("payload is not a JSON object".to_string());
        };

        let items = match object.remove("items") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(format!("payload.items should be an array, got {}", json_kind(&other)))
            }
            None => return Err("payload.items is missing".to_string()),
        };

        Ok(Self {
            total_count: object.get("total_count").and_then(Value::as_u64),
            incomplete_results: object.get("incomplete_results").and_then(Value::as_bool),
            items,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Non-empty logins among the first `limit` items, in order.
    ///
    /// The slice is taken before filtering, so a malformed item still uses up
    /// one of the `limit` slots.
    pub fn candidate_logins(&self, limit: usize) -> Vec<String> {
        self.items
            .iter()
            .take(limit)
            .filter_map(|item| item.get("login").and_then(Value::as_str))
            .filter(|login| !login.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
