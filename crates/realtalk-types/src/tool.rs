use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function call requested by the model, extracted from `response.done`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub call_id: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    /// Builds a request from the model's JSON-encoded argument string.
    ///
    /// Arguments that are not a JSON object yield an empty map; the tool
    /// handler reports missing fields itself.
    pub fn from_raw_arguments(name: &str, call_id: &str, raw: &str) -> Self {
        let arguments = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            name: name.to_string(),
            call_id: call_id.to_string(),
            arguments,
        }
    }

    /// A trimmed, non-empty string argument.
    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A message left for the owner during this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub name: String,
    pub contact: Option<String>,
    pub message: String,
    pub urgency: Option<String>,
    /// RFC 3339 UTC timestamp of when the message was taken.
    pub timestamp: String,
}
