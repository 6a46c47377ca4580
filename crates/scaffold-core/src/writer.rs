//! Write orchestrator: single-file, batch and directory writes through the sandbox.
//!
//! Every operation returns a [`WriteResult`] instead of failing, so one bad
//! entry never aborts the rest of a batch. Replacing an existing file goes
//! through a temp file in the same directory plus a rename, so readers see
//! either the old or the new content and nothing in between.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::content::Content;
use crate::context::RunContext;
use crate::error::{Result, ScaffoldError};
use crate::file_map::FileBatch;
use crate::obs;

/// What happened to one target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// File content written to disk.
    Written,
    /// Dry run: resolved and sized, nothing touched.
    Simulated,
    /// Directory exists (created now or already present).
    Created,
    /// Existing file left untouched on purpose.
    Kept,
    Failed,
}

/// Per-path outcome of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    pub ok: bool,
    pub path: String,
    pub status: WriteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    /// Hex SHA-256 of the normalized content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl WriteResult {
    fn success(path: &str, resolved: PathBuf, status: WriteStatus) -> Self {
        Self {
            ok: true,
            path: path.to_string(),
            status,
            resolved: Some(resolved),
            bytes_written: None,
            digest: None,
            error: None,
            error_kind: None,
        }
    }

    fn with_content(mut self, text: &str) -> Self {
        self.bytes_written = Some(text.len() as u64);
        self.digest = Some(content_digest(text));
        self
    }

    /// Record `err` as the outcome for `path`.
    pub fn failed(path: &str, err: &ScaffoldError) -> Self {
        let resolved = match err {
            ScaffoldError::PathEscape { resolved, .. } => Some(resolved.clone()),
            ScaffoldError::FileExistsNoOverwrite { path }
            | ScaffoldError::IsADirectory { path }
            | ScaffoldError::Io { path, .. } => Some(path.clone()),
            _ => None,
        };
        Self {
            ok: false,
            path: path.to_string(),
            status: WriteStatus::Failed,
            resolved,
            bytes_written: None,
            digest: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.status == WriteStatus::Simulated
    }
}

/// Aggregate outcome of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWriteResult {
    /// Logical AND of every result's `ok`.
    pub ok: bool,
    /// One result per unique target path, in first-appearance order.
    pub results: Vec<WriteResult>,
}

impl BatchWriteResult {
    fn from_results(results: Vec<WriteResult>) -> Self {
        Self {
            ok: results.iter().all(|r| r.ok),
            results,
        }
    }

    /// Look up the result recorded for `path` (as given in the batch).
    pub fn get(&self, path: &str) -> Option<&WriteResult> {
        self.results.iter().find(|r| r.path == path)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }
}

/// Write one file, normalizing `content` first.
pub fn write_file(
    ctx: &RunContext,
    rel_path: &str,
    content: impl Into<Content>,
    overwrite: bool,
) -> WriteResult {
    let result = content
        .into()
        .into_text()
        .and_then(|text| try_write_text(ctx, rel_path, &text, overwrite));
    finish(rel_path, result)
}

/// Write every entry of `batch`; failures are recorded, never propagated.
///
/// Duplicate paths are collapsed first so the last entry for a path wins and
/// the overwrite check only ever sees the state from before the batch.
pub fn write_batch(ctx: &RunContext, batch: &FileBatch, overwrite: bool) -> BatchWriteResult {
    let results: Vec<WriteResult> = batch
        .deduplicated()
        .into_iter()
        .map(|entry| {
            finish(
                &entry.path,
                try_write_text(ctx, &entry.path, &entry.content, overwrite),
            )
        })
        .collect();

    let outcome = BatchWriteResult::from_results(results);
    obs::emit_batch_written(
        batch.len(),
        outcome.results.len(),
        outcome.failed_count(),
        ctx.dry_run(),
    );
    outcome
}

/// Create a directory (and its parents). Succeeds if it already exists.
pub fn create_directory(ctx: &RunContext, rel_path: &str) -> WriteResult {
    let result = ctx.base().resolve(rel_path).and_then(|path| {
        if ctx.dry_run() {
            tracing::info!(path = %path.display(), "[dry-run] would create directory");
            return Ok(WriteResult::success(rel_path, path, WriteStatus::Simulated));
        }
        fs::create_dir_all(&path).map_err(|e| ScaffoldError::io(&path, e))?;
        Ok(WriteResult::success(rel_path, path, WriteStatus::Created))
    });
    finish(rel_path, result)
}

/// Create `rel_path` empty unless something already exists there.
pub fn ensure_file(ctx: &RunContext, rel_path: &str) -> WriteResult {
    let result = ctx.base().resolve(rel_path).and_then(|path| {
        if path.exists() {
            return Ok(WriteResult::success(rel_path, path, WriteStatus::Kept));
        }
        try_write_text(ctx, rel_path, "", false)
    });
    finish(rel_path, result)
}

fn try_write_text(
    ctx: &RunContext,
    rel_path: &str,
    text: &str,
    overwrite: bool,
) -> Result<WriteResult> {
    let path = ctx.base().resolve(rel_path)?;
    // Checked before the dry-run branch so a simulation fails where a real write would.
    if path == ctx.base_path() || path.is_dir() {
        return Err(ScaffoldError::IsADirectory { path });
    }
    if path.exists() && !overwrite {
        return Err(ScaffoldError::FileExistsNoOverwrite { path });
    }
    if ctx.dry_run() {
        tracing::info!(
            path = %path.display(),
            bytes = text.len(),
            "[dry-run] would write file"
        );
        return Ok(WriteResult::success(rel_path, path, WriteStatus::Simulated).with_content(text));
    }
    persist_atomically(&path, text.as_bytes())?;
    Ok(WriteResult::success(rel_path, path, WriteStatus::Written).with_content(text))
}

fn finish(rel_path: &str, result: Result<WriteResult>) -> WriteResult {
    let result = result.unwrap_or_else(|err| WriteResult::failed(rel_path, &err));
    obs::emit_write_result(&result);
    result
}

/// Write `data` to `target` via a sibling temp file and a rename.
pub(crate) fn persist_atomically(target: &Path, data: &[u8]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        ScaffoldError::io(
            target,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;
    fs::create_dir_all(dir).map_err(|e| ScaffoldError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ScaffoldError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| ScaffoldError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| ScaffoldError::io(tmp.path(), e))?;

    // Temp files are created 0600; keep the mode a plain write would give.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(target)
            .map(|m| m.permissions().mode() & 0o7777)
            .unwrap_or(0o644);
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))
            .map_err(|e| ScaffoldError::io(tmp.path(), e))?;
    }

    tmp.persist(target)
        .map_err(|e| ScaffoldError::io(target, e.error))?;
    Ok(())
}

/// Hex SHA-256 of a text payload.
pub fn content_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
