//! Sandboxed read helpers for inspecting a materialized project.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::error::{Result, ScaffoldError};

/// Content of a text file read from under the base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFile {
    pub path: String,
    pub content: String,
    pub bytes: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_file: bool,
}

/// Read a UTF-8 file, refusing anything larger than `max_bytes` when given.
pub fn read_text_file(ctx: &RunContext, rel_path: &str, max_bytes: Option<u64>) -> Result<TextFile> {
    let path = ctx.base().resolve(rel_path)?;
    if !path.exists() {
        return Err(ScaffoldError::NotFound { path });
    }
    let data = fs::read(&path).map_err(|e| ScaffoldError::io(&path, e))?;
    let size = data.len() as u64;
    if let Some(limit) = max_bytes {
        if size > limit {
            return Err(ScaffoldError::TooLarge { path, size, limit });
        }
    }
    Ok(TextFile {
        path: path.to_string_lossy().into_owned(),
        content: String::from_utf8(data)?,
        bytes: size,
    })
}

/// List a directory, sorted by entry name.
pub fn list_directory(ctx: &RunContext, rel_path: &str) -> Result<Vec<DirEntryInfo>> {
    let path = ctx.base().resolve(rel_path)?;
    if !path.exists() {
        return Err(ScaffoldError::NotFound { path });
    }
    if !path.is_dir() {
        return Err(ScaffoldError::NotADirectory { path });
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(&path).map_err(|e| ScaffoldError::io(&path, e))? {
        let entry = entry.map_err(|e| ScaffoldError::io(&path, e))?;
        let child = entry.path();
        entries.push(DirEntryInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: child.is_dir(),
            is_file: child.is_file(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::BaseDirectory;

    fn ctx() -> (tempfile::TempDir, RunContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(BaseDirectory::open(dir.path()).unwrap(), false);
        (dir, ctx)
    }

    #[test]
    fn test_read_returns_content() {
        let (dir, ctx) = ctx();
        fs::write(dir.path().join("notes.txt"), "hello world").unwrap();
        let file = read_text_file(&ctx, "notes.txt", None).unwrap();
        assert_eq!(file.content, "hello world");
        assert_eq!(file.bytes, 11);
    }

    #[test]
    fn test_read_missing_and_oversized() {
        let (dir, ctx) = ctx();
        assert!(matches!(
            read_text_file(&ctx, "nope.txt", None),
            Err(ScaffoldError::NotFound { .. })
        ));

        fs::write(dir.path().join("big.txt"), "0123456789").unwrap();
        match read_text_file(&ctx, "big.txt", Some(4)) {
            Err(ScaffoldError::TooLarge { size, limit, .. }) => {
                assert_eq!(size, 10);
                assert_eq!(limit, 4);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_read_rejects_non_utf8() {
        let (dir, ctx) = ctx();
        fs::write(dir.path().join("blob.bin"), [0xffu8, 0xfe]).unwrap();
        let err = read_text_file(&ctx, "blob.bin", None).unwrap_err();
        assert_eq!(err.kind(), "encoding");
    }

    #[test]
    fn test_read_outside_base_rejected() {
        let (_dir, ctx) = ctx();
        let err = read_text_file(&ctx, "../../etc/hostname", None).unwrap_err();
        assert_eq!(err.kind(), "path_escape");
    }

    #[test]
    fn test_list_directory_entries() {
        let (dir, ctx) = ctx();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        let entries = list_directory(&ctx, ".").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b.txt"]);
        assert!(entries[0].is_dir);
        assert!(!entries[0].is_file);
    }

    #[test]
    fn test_list_file_is_not_a_directory() {
        let (dir, ctx) = ctx();
        fs::write(dir.path().join("f.txt"), "").unwrap();
        assert!(matches!(
            list_directory(&ctx, "f.txt"),
            Err(ScaffoldError::NotADirectory { .. })
        ));
    }
}
