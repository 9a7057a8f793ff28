//! Filesystem helpers shared by build, sync and pull.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use nbpublish_shared::{PublishError, Result};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write `bytes` to `target` via a sibling temp file and a rename.
///
/// Parent directories are created as needed.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| PublishError::io(target, std::io::Error::other("path has no parent")))?;
    std::fs::create_dir_all(parent).map_err(|e| PublishError::io(parent, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| PublishError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| PublishError::io(target, e))?;

    debug!(path = %target.display(), size = bytes.len(), "wrote file");
    Ok(())
}

/// Write a JSON file (pretty-printed, trailing newline).
pub fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(data)
        .map_err(|e| PublishError::parse(format!("JSON serialization failed: {e}")))?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
}

/// Every regular file under `root`, as sorted root-relative paths.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk_into(root, Path::new(""), false, &mut files)?;
    files.sort();
    Ok(files)
}

/// Like [`walk_files`], skipping dot-files and dot-directories (`.git`, `.github`).
pub fn walk_visible_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk_into(root, Path::new(""), true, &mut files)?;
    files.sort();
    Ok(files)
}

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn walk_into(root: &Path, rel: &Path, skip_hidden: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let dir = root.join(rel);
    let entries = std::fs::read_dir(&dir).map_err(|e| PublishError::io(&dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| PublishError::io(&dir, e))?;
        if skip_hidden && is_hidden(&entry.file_name()) {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| PublishError::io(entry.path(), e))?;
        let child = rel.join(entry.file_name());
        if file_type.is_dir() {
            walk_into(root, &child, skip_hidden, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}
