//! Path sandbox: every filesystem operation resolves through here.
//!
//! Resolution is lexical first (`.` and `..` are folded without touching the
//! disk), then the longest existing ancestor is canonicalized so a symlink
//! already present under the base cannot redirect a write outside it. The
//! target itself does not need to exist.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ScaffoldError};

/// The single writable root of a run. Always absolute and canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseDirectory {
    root: PathBuf,
}

impl BaseDirectory {
    /// Open an existing directory as the base of a run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = fs::canonicalize(path).map_err(|e| ScaffoldError::BaseDirectory {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !root.is_dir() {
            return Err(ScaffoldError::BaseDirectory {
                path: root,
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    /// Create the directory (unless `dry_run`) and open it.
    ///
    /// In dry-run mode the directory must already exist.
    pub fn prepare(path: impl AsRef<Path>, dry_run: bool) -> Result<Self> {
        let path = path.as_ref();
        if !dry_run {
            fs::create_dir_all(path).map_err(|e| ScaffoldError::BaseDirectory {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Whether the base still exists on disk.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Resolve `target` against this base, rejecting escapes.
    pub fn resolve(&self, target: impl AsRef<Path>) -> Result<PathBuf> {
        resolve_within(&self.root, target.as_ref())
    }
}

/// Resolve `target` (relative or absolute) against `base`.
///
/// Fails with [`ScaffoldError::PathEscape`] when the resolved path is not
/// contained in the resolved base.
pub fn resolve(base: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<PathBuf> {
    let base = canonicalize_existing_prefix(&normalize_lexically(base.as_ref()));
    resolve_within(&base, target.as_ref())
}

fn resolve_within(base: &Path, target: &Path) -> Result<PathBuf> {
    let joined = normalize_lexically(&base.join(target));
    let resolved = canonicalize_existing_prefix(&joined);
    if !resolved.starts_with(base) {
        return Err(ScaffoldError::PathEscape {
            path: target.to_string_lossy().into_owned(),
            resolved,
        });
    }
    Ok(resolved)
}

/// Fold `.` and `..` segments without consulting the filesystem.
///
/// `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor and re-attach the rest.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if let Ok(real) = fs::canonicalize(ancestor) {
            return match path.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    path.to_path_buf()
}
