//! Build orchestrator: manifest → artifact tree for one destination kind.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use nbpublish_markdown::{Injection, inject_web_content, web_source_reference};
use nbpublish_notebook::{NotebookDocument, load_source};
use nbpublish_shared::{BuildProfile, DestinationKind, PublishError, Result, Warning};

use crate::files::{sha256_hex, write_atomic, write_json};
use crate::manifest::ManifestStore;
use crate::transform::transform;

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before an output is generated.
    fn entry_started(&self, id: &str, current: usize, total: usize);
    /// Called after an output is written or has failed.
    fn entry_finished(&self, outcome: &EntryOutcome);
    /// Called when the build completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn entry_started(&self, _id: &str, _current: usize, _total: usize) {}
    fn entry_finished(&self, _outcome: &EntryOutcome) {}
    fn done(&self, _report: &BuildReport) {}
}

/// Result of one (entry, destination) pair.
#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    pub id: String,
    /// Relative to the tree root.
    pub output: PathBuf,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Built {
        sha256: String,
        bytes: usize,
        warnings: Vec<Warning>,
    },
    Failed {
        error: String,
    },
}

impl EntryOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self.status, OutcomeStatus::Built { .. })
    }
}

/// Everything a build run produced.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub kind: DestinationKind,
    pub profile: String,
    pub tree: PathBuf,
    pub outcomes: Vec<EntryOutcome>,
    pub elapsed_ms: u128,
}

impl BuildReport {
    /// True when no entry failed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(EntryOutcome::is_built)
    }

    /// Ids of failed entries, in manifest order, without repeats.
    pub fn failed_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for outcome in self.outcomes.iter().filter(|o| !o.is_built()) {
            if !ids.contains(&outcome.id.as_str()) {
                ids.push(&outcome.id);
            }
        }
        ids
    }

    /// Total warnings across built outputs.
    pub fn warning_count(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match &o.status {
                OutcomeStatus::Built { warnings, .. } => warnings.len(),
                OutcomeStatus::Failed { .. } => 0,
            })
            .sum()
    }

    /// Write the report as JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }
}

/// Delete and regenerate the artifact tree for `kind`.
///
/// A failing entry is recorded in the report and does not stop the others.
/// Only failures to reset the tree itself abort the build.
#[instrument(skip_all, fields(kind = %kind, profile = %profile.name))]
pub fn build(
    store: &ManifestStore,
    kind: DestinationKind,
    profile: &BuildProfile,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let start = Instant::now();
    let started_at = Utc::now();
    let run_id = Uuid::now_v7();
    let tree = store.tree_root(kind);

    info!(%run_id, tree = %tree.display(), "starting build");

    progress.phase("Resetting tree");
    reset_tree(&tree)?;

    let entries = store.entries_for(kind);
    let total: usize = entries.iter().map(|e| e.destinations_of(kind).count()).sum();
    let mut outcomes = Vec::with_capacity(total);

    progress.phase("Generating artifacts");
    let mut current = 0;
    for entry in entries {
        let document = load_source(&entry.source_path);

        for destination in entry.destinations_of(kind) {
            current += 1;
            progress.entry_started(&entry.id, current, total);

            let status = document
                .as_ref()
                .map_err(|e| PublishError::transform(&entry.id, e.to_string()))
                .and_then(|doc| {
                    let (doc, injected) = if destination.options.inject_web_content {
                        let (filled, warnings) = fill_web_content(store, doc);
                        (Cow::Owned(filled), warnings)
                    } else {
                        (Cow::Borrowed(doc), Vec::new())
                    };
                    let mut artifact = transform(&doc, entry, destination, profile)?;
                    artifact.warnings.splice(0..0, injected);
                    Ok(artifact)
                })
                .and_then(|artifact| {
                    let target = tree.join(&artifact.relative_path);
                    write_atomic(&target, &artifact.bytes)?;
                    for w in &artifact.warnings {
                        warn!(id = %entry.id, output = %artifact.relative_path.display(), "{w}");
                    }
                    Ok(OutcomeStatus::Built {
                        sha256: sha256_hex(&artifact.bytes),
                        bytes: artifact.bytes.len(),
                        warnings: artifact.warnings,
                    })
                })
                .unwrap_or_else(|e| {
                    warn!(id = %entry.id, error = %e, "entry failed");
                    OutcomeStatus::Failed {
                        error: e.to_string(),
                    }
                });

            let outcome = EntryOutcome {
                id: entry.id.clone(),
                output: destination.output_path.clone(),
                status,
            };
            progress.entry_finished(&outcome);
            outcomes.push(outcome);
        }
    }

    let report = BuildReport {
        run_id,
        started_at,
        kind,
        profile: profile.name.clone(),
        tree,
        outcomes,
        elapsed_ms: start.elapsed().as_millis(),
    };

    info!(
        outputs = report.outcomes.len(),
        failed = report.failed_ids().len(),
        warnings = report.warning_count(),
        elapsed_ms = report.elapsed_ms,
        "build complete"
    );
    progress.done(&report);

    Ok(report)
}

/// Fill the web region of each markdown cell from the file its SOURCE marker names.
fn fill_web_content(store: &ManifestStore, doc: &NotebookDocument) -> (NotebookDocument, Vec<Warning>) {
    let mut doc = doc.clone();
    let mut warnings = Vec::new();

    for (index, cell) in doc.cells.iter_mut().enumerate() {
        if !cell.is_markdown() {
            continue;
        }
        let Some(reference) = web_source_reference(&cell.source).map(str::to_string) else {
            continue;
        };
        let Some(path) = store.resolve_web_source(&reference) else {
            warnings.push(Warning::cell(index, format!("unsupported web content source '{reference}'")));
            continue;
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warnings.push(Warning::cell(
                    index,
                    format!("web content source {} unreadable: {e}", path.display()),
                ));
                continue;
            }
        };
        match inject_web_content(&cell.source, &text) {
            Injection::Replaced(filled) => cell.source = filled,
            Injection::SourceMissingRegion => warnings.push(Warning::cell(
                index,
                format!("web content source {} has no web content markers", path.display()),
            )),
            Injection::TargetMissingRegion => {
                warnings.push(Warning::cell(index, "no web content markers to fill"));
            }
        }
    }

    (doc, warnings)
}

fn reset_tree(tree: &Path) -> Result<()> {
    if tree.exists() {
        std::fs::remove_dir_all(tree).map_err(|e| PublishError::io(tree, e))?;
    }
    std::fs::create_dir_all(tree).map_err(|e| PublishError::io(tree, e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::walk_files;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nbp-build-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("notebooks")).unwrap();
        std::fs::copy(
            "../../../fixtures/notebooks/sample.ipynb",
            dir.join("notebooks/sample.ipynb"),
        )
        .unwrap();
        std::fs::write(dir.join("notebooks/helpers.py"), "def f():\n    return 1\n").unwrap();
        dir
    }

    const MANIFEST: &str = r#"
[trees]
nexus_build = "out/nexus"
ci_build = "out/ci"

[[notebooks]]
id = "sample"
source_path = "notebooks/sample.ipynb"
nexus_support = true

[[notebooks.destinations]]
kind = "nexus_build"
output_path = "sample/sample.ipynb"
rewrite = [{ pattern = '^\.\./data/', replacement = "../../data/" }]

[[notebooks.destinations]]
kind = "ci_build"
output_path = "sample.ipynb"

[[notebooks]]
id = "helpers"
source_path = "notebooks/helpers.py"
nexus_support = true

[[notebooks.destinations]]
kind = "nexus_build"
output_path = "utils/helpers.py"
"#;

    fn load(dir: &Path, body: &str) -> ManifestStore {
        let path = dir.join("notebooks_manifest.toml");
        std::fs::write(&path, body).unwrap();
        ManifestStore::load(&path).unwrap()
    }

    #[test]
    fn builds_nexus_tree() {
        let dir = temp_dir();
        let store = load(&dir, MANIFEST);

        let report = build(&store, DestinationKind::NexusBuild, &BuildProfile::publish(), &SilentProgress).unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);

        let tree = store.tree_root(DestinationKind::NexusBuild);
        assert_eq!(
            walk_files(&tree).unwrap(),
            vec![PathBuf::from("sample/sample.ipynb"), PathBuf::from("utils/helpers.py")]
        );
        assert_eq!(
            std::fs::read_to_string(tree.join("utils/helpers.py")).unwrap(),
            "def f():\n    return 1\n"
        );
        let nb = NotebookDocument::read(&tree.join("sample/sample.ipynb")).unwrap();
        assert_eq!(nb.metadata["nbpublish"]["source_id"], "sample");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rebuild_removes_stale_files_and_is_byte_identical() {
        let dir = temp_dir();
        let store = load(&dir, MANIFEST);
        let tree = store.tree_root(DestinationKind::NexusBuild);

        build(&store, DestinationKind::NexusBuild, &BuildProfile::publish(), &SilentProgress).unwrap();
        let first = std::fs::read(tree.join("sample/sample.ipynb")).unwrap();
        std::fs::write(tree.join("stale.ipynb"), "{}").unwrap();

        build(&store, DestinationKind::NexusBuild, &BuildProfile::publish(), &SilentProgress).unwrap();
        assert!(!tree.join("stale.ipynb").exists());
        assert_eq!(std::fs::read(tree.join("sample/sample.ipynb")).unwrap(), first);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failing_entry_is_isolated() {
        let dir = temp_dir();
        let store = load(&dir, MANIFEST);
        std::fs::write(dir.join("notebooks/sample.ipynb"), "{not json").unwrap();

        let report = build(&store, DestinationKind::NexusBuild, &BuildProfile::publish(), &SilentProgress).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed_ids(), vec!["sample"]);
        assert!(store.tree_root(DestinationKind::NexusBuild).join("utils/helpers.py").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn report_serializes_with_status_tags() {
        let dir = temp_dir();
        let store = load(&dir, MANIFEST);
        let report = build(&store, DestinationKind::CiBuild, &BuildProfile::fast(), &SilentProgress).unwrap();

        let path = dir.join("report.json");
        report.write_json(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["kind"], "ci_build");
        assert_eq!(json["profile"], "fast");
        assert_eq!(json["outcomes"][0]["status"], "built");
        assert_eq!(json["outcomes"][0]["sha256"].as_str().unwrap().len(), 64);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn web_content_filled_from_named_source() {
        let dir = temp_dir();
        std::fs::create_dir_all(dir.join("docs")).unwrap();
        std::fs::write(
            dir.join("docs/page.md"),
            "intro\n<!-- BEGIN WEB CONTENT -->\nfresh text\n<!-- END WEB CONTENT -->\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("notebooks/guide.md"),
            "# Guide\n<!-- SOURCE (web content): docs/page.md -->\n<!-- BEGIN WEB CONTENT -->\nstale\n<!-- END WEB CONTENT -->\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("notebooks/broken.md"),
            "<!-- SOURCE (web content): docs/missing.md -->\n<!-- BEGIN WEB CONTENT -->\nold\n<!-- END WEB CONTENT -->\n",
        )
        .unwrap();
        let store = load(
            &dir,
            r#"
[trees]
ci_build = "out/ci"

[[notebooks]]
id = "guide"
source_path = "notebooks/guide.md"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "guide.md"
[notebooks.destinations.options]
inject_web_content = true

[[notebooks]]
id = "broken"
source_path = "notebooks/broken.md"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "broken.md"
[notebooks.destinations.options]
inject_web_content = true
"#,
        );

        let report = build(&store, DestinationKind::CiBuild, &BuildProfile::fast(), &SilentProgress).unwrap();
        assert!(report.is_success());

        let tree = store.tree_root(DestinationKind::CiBuild);
        let guide = std::fs::read_to_string(tree.join("guide.md")).unwrap();
        assert!(guide.contains("fresh text"));
        assert!(!guide.contains("stale"));

        let broken = std::fs::read_to_string(tree.join("broken.md")).unwrap();
        assert!(broken.contains("old"));
        match &report.outcomes[1].status {
            OutcomeStatus::Built { warnings, .. } => {
                assert!(warnings.iter().any(|w| w.message.contains("unreadable")));
            }
            OutcomeStatus::Failed { error } => panic!("unexpected failure: {error}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
