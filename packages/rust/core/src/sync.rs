//! Sync dispatcher: copy a finished tree into an external working directory.
//!
//! Plain filesystem copies. Nothing here touches version control; committing
//! and opening pull requests in the external repository is left to its owners.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use nbpublish_markdown::scan_tokens;
use nbpublish_notebook::{CellType, NotebookDocument};
use nbpublish_shared::{PublishError, Result, Warning};

use crate::files::{sha256_hex, walk_files, walk_visible_files, write_atomic};

/// Sync behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Delete orphaned files.
    pub prune: bool,
    /// Compute the report without writing anything.
    pub dry_run: bool,
}

/// What a sync changed (or would change), relative to the external root.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub added: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Files under the external root that are absent from the tree, left in place.
    pub orphaned: Vec<PathBuf>,
    pub unchanged: usize,
    pub warnings: Vec<Warning>,
    pub dry_run: bool,
}

impl SyncReport {
    /// True when the external root differs from the tree in a way this run acted on.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty())
    }
}

/// Mirror `tree` into `external_root`.
///
/// A file is rewritten only when its SHA-256 differs. Any file under the
/// external root that is absent from the tree is an orphan: removed with
/// `prune`, otherwise reported. Dot-files and dot-directories (`.git`) are
/// never touched.
#[instrument(skip_all, fields(tree = %tree.display(), external_root = %external_root.display()))]
pub fn sync(tree: &Path, external_root: &Path, options: &SyncOptions) -> Result<SyncReport> {
    if !tree.is_dir() {
        return Err(PublishError::sync(format!(
            "artifact tree {} does not exist; run build first",
            tree.display()
        )));
    }
    check_root(external_root, options.dry_run)?;

    let mut report = SyncReport {
        dry_run: options.dry_run,
        ..SyncReport::default()
    };

    let files = walk_files(tree)?;
    let tree_set: BTreeSet<&PathBuf> = files.iter().collect();

    for rel in &files {
        let source = tree.join(rel);
        let target = external_root.join(rel);
        let bytes = std::fs::read(&source).map_err(|e| PublishError::io(&source, e))?;

        let existing = match std::fs::read(&target) {
            Ok(existing) => Some(existing),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(PublishError::io(&target, e)),
        };

        match existing {
            None => report.added.push(rel.clone()),
            Some(existing) if sha256_hex(&existing) != sha256_hex(&bytes) => {
                report.changed.push(rel.clone())
            }
            Some(_) => {
                report.unchanged += 1;
                continue;
            }
        }

        report.warnings.extend(escaping_paths(rel, &bytes));

        if !options.dry_run {
            write_atomic(&target, &bytes)?;
            debug!(file = %rel.display(), "synced file");
        }
    }

    let mut orphans: Vec<PathBuf> = walk_visible_files(external_root)?
        .into_iter()
        .filter(|rel| !tree_set.contains(rel))
        .collect();
    orphans.sort();

    for rel in orphans {
        if options.prune {
            if !options.dry_run {
                let path = external_root.join(&rel);
                std::fs::remove_file(&path).map_err(|e| PublishError::io(&path, e))?;
                remove_empty_parents(external_root, &rel);
            }
            report.removed.push(rel);
        } else {
            warn!(file = %rel.display(), "orphaned file left in place (use --prune to remove)");
            report
                .warnings
                .push(Warning::doc(format!("orphaned file {}", rel.display())));
            report.orphaned.push(rel);
        }
    }

    info!(
        added = report.added.len(),
        changed = report.changed.len(),
        removed = report.removed.len(),
        orphaned = report.orphaned.len(),
        unchanged = report.unchanged,
        dry_run = options.dry_run,
        "sync complete"
    );

    Ok(report)
}

fn check_root(root: &Path, dry_run: bool) -> Result<()> {
    let meta = std::fs::metadata(root).map_err(|e| {
        PublishError::sync(format!("external root {} is not accessible: {e}", root.display()))
    })?;
    if !meta.is_dir() {
        return Err(PublishError::sync(format!(
            "external root {} is not a directory",
            root.display()
        )));
    }
    if meta.permissions().readonly() {
        return Err(PublishError::sync(format!(
            "external root {} is not writable",
            root.display()
        )));
    }
    if dry_run {
        return Ok(());
    }

    let marker = root.join(format!(".nbpublish-write-check-{}", uuid::Uuid::now_v7()));
    std::fs::write(&marker, b"").map_err(|e| {
        PublishError::sync(format!("external root {} is not writable: {e}", root.display()))
    })?;
    let _ = std::fs::remove_file(&marker);
    Ok(())
}

/// Remove directories emptied by a prune, walking up from `rel` but never
/// removing `root` itself.
fn remove_empty_parents(root: &Path, rel: &Path) {
    let mut dir = rel.parent();
    while let Some(d) = dir.filter(|d| !d.as_os_str().is_empty()) {
        if std::fs::remove_dir(root.join(d)).is_err() {
            break;
        }
        debug!(dir = %d.display(), "removed empty directory");
        dir = d.parent();
    }
}

/// Relative link targets that would point outside the external root.
fn escaping_paths(rel: &Path, bytes: &[u8]) -> Vec<Warning> {
    let ext = rel.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Vec::new();
    };

    let sources: Vec<String> = match ext {
        "ipynb" => match NotebookDocument::from_json_str(text) {
            Ok(doc) => doc
                .cells
                .into_iter()
                .filter(|c| c.is_markdown())
                .map(|c| c.source)
                .collect(),
            Err(_) => return Vec::new(),
        },
        "md" => vec![text.to_string()],
        _ => return Vec::new(),
    };

    let base = rel.parent().unwrap_or(Path::new(""));
    let mut warnings = Vec::new();
    for source in &sources {
        for token in scan_tokens(CellType::Markdown, source) {
            if escapes_root(&base.join(&token.value)) {
                warnings.push(Warning::doc(format!(
                    "{}: '{}' points outside the sync root",
                    rel.display(),
                    token.value
                )));
            }
        }
    }
    warnings
}

fn escapes_root(path: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
        if depth < 0 {
            return true;
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
