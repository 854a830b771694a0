//! Stage-1 Response Parsing
//!
//! The init request answers with a two-element array
//! `[hostPrefixRaw, blockedPrefixRaw]`. Parsing is injectable so an owner can
//! plug in its own wire codec; the default is plain JSON.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("expected a JSON array, got {0}")]
    NotAnArray(String),
}

/// Converts raw response text into a structured array
///
/// Implementations must never return a partial structure: anything they
/// cannot fully decode is a `ParseError`.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<Vec<Value>, ParseError>;
}

/// Default parser using `serde_json`
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResponseParser;

impl ResponseParser for JsonResponseParser {
    fn parse(&self, text: &str) -> Result<Vec<Value>, ParseError> {
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let value: Value =
            serde_json::from_str(text).map_err(|e| ParseError::Malformed(e.to_string()))?;

        match value {
            Value::Array(items) => Ok(items),
            other => Err(ParseError::NotAnArray(json_type_name(&other).to_string())),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Host and blocked prefixes extracted from a parsed stage-1 array
///
/// Missing elements, `null`, and non-string values become `None`; the blocked
/// prefix is additionally `None` when empty, so callers can treat `Some` as
/// "a blocked check is required".
pub fn extract_prefixes(items: &[Value]) -> (Option<String>, Option<String>) {
    let host_raw = items.first().and_then(Value::as_str).map(str::to_string);
    let blocked = items
        .get(1)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    (host_raw, blocked)
}
