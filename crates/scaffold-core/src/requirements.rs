//! Requirements documents and the placeholder hints they may carry.
//!
//! The document itself is opaque; only `file_structure.directories` and
//! `file_structure.files` are read, to pre-create empty placeholders.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RunContext;
use crate::error::{Result, ScaffoldError};
use crate::writer::{self, WriteResult};

/// Read and parse a JSON requirements document.
pub fn load_requirements(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ScaffoldError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = fs::read_to_string(path).map_err(|e| ScaffoldError::io(path, e))?;
    serde_json::from_str(&raw)
        .map_err(|e| ScaffoldError::Requirements(format!("failed to parse {}: {e}", path.display())))
}

/// Follow a chain of object keys, returning `None` on any miss.
pub fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(value, |cur, key| cur.get(*key))
}

/// Directories and files a requirements document asks to exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderHints {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

impl PlaceholderHints {
    pub fn from_requirements(requirements: &Value) -> Self {
        Self {
            directories: hinted_paths(lookup(requirements, &["file_structure", "directories"])),
            files: hinted_paths(lookup(requirements, &["file_structure", "files"])),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Accept plain strings or objects carrying a `path`; ignore the rest.
fn hinted_paths(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("path").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .filter(|p| !p.trim().is_empty())
        .collect()
}

/// Create hinted directories, and hinted files only where nothing exists yet.
pub fn seed_placeholders(ctx: &RunContext, hints: &PlaceholderHints) -> Vec<WriteResult> {
    let dirs = hints
        .directories
        .iter()
        .map(|dir| writer::create_directory(ctx, dir));
    let files = hints.files.iter().map(|file| writer::ensure_file(ctx, file));
    dirs.chain(files).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::BaseDirectory;
    use crate::writer::WriteStatus;
    use serde_json::json;

    #[test]
    fn test_lookup_nested() {
        let req = json!({"project": {"name": "demo"}});
        assert_eq!(lookup(&req, &["project", "name"]), Some(&json!("demo")));
        assert_eq!(lookup(&req, &["project", "missing"]), None);
        assert_eq!(lookup(&req, &["project", "name", "deeper"]), None);
    }

    #[test]
    fn test_hints_accept_strings_and_objects() {
        let req = json!({
            "file_structure": {
                "directories": ["src", {"path": "tests"}, 3],
                "files": [{"path": "src/__init__.py", "purpose": "package"}, ""]
            }
        });
        let hints = PlaceholderHints::from_requirements(&req);
        assert_eq!(hints.directories, vec!["src", "tests"]);
        assert_eq!(hints.files, vec!["src/__init__.py"]);
    }

    #[test]
    fn test_no_hints_when_absent() {
        assert!(PlaceholderHints::from_requirements(&json!({"project": {}})).is_empty());
    }

    #[test]
    fn test_load_requirements_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_requirements(&dir.path().join("none.json")),
            Err(ScaffoldError::NotFound { .. })
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert_eq!(load_requirements(&bad).unwrap_err().kind(), "requirements");

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"project": {"name": "x"}}"#).unwrap();
        assert_eq!(load_requirements(&good).unwrap()["project"]["name"], "x");
    }

    #[test]
    fn test_seed_placeholders_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(BaseDirectory::open(dir.path()).unwrap(), false);
        fs::write(dir.path().join("README.md"), "keep me").unwrap();

        let hints = PlaceholderHints {
            directories: vec!["src/pkg".to_string()],
            files: vec!["README.md".to_string(), "src/pkg/__init__.py".to_string()],
        };
        let results = seed_placeholders(&ctx, &hints);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.ok));
        assert_eq!(results[1].status, WriteStatus::Kept);
        assert_eq!(fs::read_to_string(dir.path().join("README.md")).unwrap(), "keep me");
        assert!(dir.path().join("src/pkg/__init__.py").is_file());
    }
}
