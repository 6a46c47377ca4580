//! Content normalization: any accepted payload shape becomes one `String`.
//!
//! Rules, first match wins:
//! 1. text is returned unchanged
//! 2. bytes are decoded as UTF-8 (the only failure)
//! 3. a sequence is stringified item by item and joined with `\n`
//! 4. a mapping with a content-bearing key is normalized from that field
//! 5. anything else is rendered as pretty JSON, so nothing is dropped

use serde_json::Value;

use crate::error::Result;

/// Keys whose value is taken as the file body, checked in this order.
pub const CONTENT_KEYS: [&str; 4] = ["text", "content", "value", "body"];

/// Key holding a sequence of lines.
pub const LINES_KEY: &str = "lines";

/// Key holding a sequence of independently normalized chunks.
pub const CHUNKS_KEY: &str = "chunks";

/// Nesting limit for content-bearing indirections before falling back to JSON.
const MAX_DEPTH: usize = 32;

/// A raw content payload as handed over by a planner.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl Content {
    /// Normalize into text. Fails only on invalid UTF-8 bytes.
    pub fn into_text(self) -> Result<String> {
        normalize(self)
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Json(other),
        }
    }
}

impl From<Vec<String>> for Content {
    fn from(lines: Vec<String>) -> Self {
        Self::Json(Value::Array(lines.into_iter().map(Value::String).collect()))
    }
}

impl From<Vec<&str>> for Content {
    fn from(lines: Vec<&str>) -> Self {
        Self::Json(Value::Array(
            lines.into_iter().map(|l| Value::String(l.to_string())).collect(),
        ))
    }
}

/// Normalize any supported payload into text.
pub fn normalize(content: Content) -> Result<String> {
    match content {
        Content::Text(text) => Ok(text),
        Content::Bytes(bytes) => Ok(String::from_utf8(bytes)?),
        Content::Json(value) => Ok(normalize_value(&value)),
    }
}

/// Normalize a JSON payload. Total: never fails.
pub fn normalize_value(value: &Value) -> String {
    normalize_at_depth(value, 0)
}

fn normalize_at_depth(value: &Value, depth: usize) -> String {
    if depth > MAX_DEPTH {
        return to_pretty_json(value);
    }
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => join_lines(items.iter().map(stringify_item)),
        Value::Object(map) => {
            for key in CONTENT_KEYS {
                if let Some(inner) = map.get(key) {
                    return normalize_at_depth(inner, depth + 1);
                }
            }
            if let Some(lines) = map.get(LINES_KEY) {
                return normalize_at_depth(lines, depth + 1);
            }
            if let Some(chunks) = map.get(CHUNKS_KEY) {
                return match chunks {
                    Value::Array(parts) => {
                        join_lines(parts.iter().map(|p| normalize_at_depth(p, depth + 1)))
                    }
                    other => normalize_at_depth(other, depth + 1),
                };
            }
            to_pretty_json(value)
        }
        Value::Bool(_) | Value::Number(_) => value.to_string(),
    }
}

/// Render one sequence item: strings verbatim, everything else as compact JSON.
fn stringify_item(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn join_lines(parts: impl Iterator<Item = String>) -> String {
    parts.collect::<Vec<_>>().join("\n")
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
