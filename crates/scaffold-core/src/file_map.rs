//! File entries and batches, with the one lenient parse step at the boundary.
//!
//! Accepted batch shapes:
//! - `{"files": [{"path": ..., "content": ...}, ...]}`
//! - `{"files": {"<path>": <content>, ...}}`
//! - a flat mapping `{"<path>": <content>, ...}`
//! - a bare list of `{"path", "content"}` objects or `[path, content]` pairs
//!
//! After [`FileBatch::parse`] only the canonical types below exist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::Content;
use crate::error::{Result, ScaffoldError};
use crate::sandbox::normalize_lexically;

/// One file to materialize. `content` is always fully normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub content: String,
}

impl FileEntry {
    /// Build an entry, normalizing `content` immediately.
    pub fn new(path: impl Into<String>, content: impl Into<Content>) -> Result<Self> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(ScaffoldError::InvalidBatch(
                "file entry requires a non-empty path".to_string(),
            ));
        }
        Ok(Self {
            path,
            content: content.into().into_text()?,
        })
    }

    /// Parse a single listed entry: an object or a `[path, content]` pair.
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(mut map) => {
                let path = match map.remove("path") {
                    Some(Value::String(p)) => p,
                    Some(other) => {
                        return Err(ScaffoldError::InvalidBatch(format!(
                            "file path must be a string, got {}",
                            type_name(&other)
                        )))
                    }
                    None => {
                        return Err(ScaffoldError::InvalidBatch(
                            "each file requires a 'path' field".to_string(),
                        ))
                    }
                };
                let content = match map.remove("content") {
                    Some(Value::Null) | None => map.remove("contents").unwrap_or(Value::Null),
                    Some(c) => c,
                };
                Self::new(path, content)
            }
            Value::Array(mut pair) if pair.len() == 2 => {
                let content = pair.pop().unwrap_or(Value::Null);
                match pair.pop() {
                    Some(Value::String(path)) => Self::new(path, content),
                    _ => Err(ScaffoldError::InvalidBatch(
                        "file pair must start with a string path".to_string(),
                    )),
                }
            }
            other => Err(ScaffoldError::InvalidBatch(format!(
                "unsupported file payload: {}",
                type_name(&other)
            ))),
        }
    }

    /// Lexically normalized path, used as the identity of the target file.
    pub fn path_key(&self) -> PathBuf {
        normalize_lexically(Path::new(&self.path))
    }
}

/// Ordered collection of file entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct FileBatch {
    files: Vec<FileEntry>,
}

/// The recognized raw shapes, before canonicalization.
enum RawBatch {
    Listed(Vec<Value>),
    Mapped(Map<String, Value>),
}

impl FileBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Parse any accepted payload shape into a batch.
    pub fn parse(raw: Value) -> Result<Self> {
        let files = match classify(raw)? {
            RawBatch::Listed(items) => items
                .into_iter()
                .map(FileEntry::from_value)
                .collect::<Result<Vec<_>>>()?,
            RawBatch::Mapped(map) => map
                .into_iter()
                .map(|(path, content)| FileEntry::new(path, content))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Self { files })
    }

    /// Parse a JSON document into a batch.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::parse(value)
    }

    /// Entries with only the last one kept per target path.
    ///
    /// Order follows each path's first appearance in the batch.
    pub fn deduplicated(&self) -> Vec<&FileEntry> {
        let mut slots: HashMap<PathBuf, usize> = HashMap::new();
        let mut out: Vec<&FileEntry> = Vec::with_capacity(self.files.len());
        for entry in &self.files {
            match slots.get(&entry.path_key()) {
                Some(&slot) => out[slot] = entry,
                None => {
                    slots.insert(entry.path_key(), out.len());
                    out.push(entry);
                }
            }
        }
        out
    }
}

impl TryFrom<Value> for FileBatch {
    type Error = ScaffoldError;

    fn try_from(value: Value) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Vec<FileEntry>> for FileBatch {
    fn from(files: Vec<FileEntry>) -> Self {
        Self { files }
    }
}

impl FromIterator<FileEntry> for FileBatch {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FileBatch {
    type Item = FileEntry;
    type IntoIter = std::vec::IntoIter<FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

fn classify(raw: Value) -> Result<RawBatch> {
    match raw {
        Value::Object(mut map) => {
            // Any other "files" value is a plain file that happens to have that
            // name; the map is left as-is so document order survives.
            if !matches!(map.get("files"), Some(Value::Array(_) | Value::Object(_))) {
                return Ok(RawBatch::Mapped(map));
            }
            match map.remove("files") {
                Some(Value::Array(items)) => Ok(RawBatch::Listed(items)),
                Some(Value::Object(inner)) => Ok(RawBatch::Mapped(inner)),
                _ => Ok(RawBatch::Mapped(map)),
            }
        }
        Value::Array(items) => Ok(RawBatch::Listed(items)),
        other => Err(ScaffoldError::InvalidBatch(format!(
            "unsupported file batch payload: {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
