//! CI executor: run a tree's notebooks under a profile with per-notebook timeouts.
//!
//! Notebooks are independent. Cells inside one notebook run in order inside
//! the kernel; only whole notebooks run concurrently, bounded by `jobs`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use nbpublish_core::files::{walk_files, write_atomic};
use nbpublish_notebook::{NotebookDocument, filter_cells};
use nbpublish_shared::{BuildProfile, PublishError, Result};

use crate::kernel::Kernel;

/// Outcome of one notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed { message: String },
    TimedOut,
    Skipped { reason: String },
}

impl RunStatus {
    /// Failed or timed out.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut)
    }
}

/// One notebook's result.
#[derive(Debug, Clone, Serialize)]
pub struct NotebookRun {
    /// Tree-relative path without the `.ipynb` extension.
    pub id: String,
    #[serde(flatten)]
    pub status: RunStatus,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

/// How to run a tree.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub profile: BuildProfile,
    /// Wall-clock budget per notebook.
    pub timeout: Duration,
    /// Notebooks run concurrently; at least 1.
    pub jobs: usize,
}

/// All runs, in sorted notebook order.
#[derive(Debug, Clone, Serialize)]
pub struct CiReport {
    pub profile: String,
    pub runs: Vec<NotebookRun>,
}

impl CiReport {
    pub fn is_success(&self) -> bool {
        !self.runs.iter().any(|r| r.status.is_failure())
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.runs
            .iter()
            .filter(|r| r.status.is_failure())
            .map(|r| r.id.as_str())
            .collect()
    }

    /// `(passed, failed, timed_out, skipped)`.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        self.runs.iter().fold((0, 0, 0, 0), |(p, f, t, s), r| match r.status {
            RunStatus::Passed => (p + 1, f, t, s),
            RunStatus::Failed { .. } => (p, f + 1, t, s),
            RunStatus::TimedOut => (p, f, t + 1, s),
            RunStatus::Skipped { .. } => (p, f, t, s + 1),
        })
    }
}

/// What to do with one notebook after inspecting it.
enum Plan {
    Skip(String),
    Run(PathBuf),
}

/// Execute every `.ipynb` under `tree`.
///
/// Each notebook is filtered by the profile into a scratch copy beside the
/// original, so relative paths resolve the same way, and the copy is removed
/// afterwards. A notebook whose `metadata.tags` hit an excluded tag, or whose
/// code cells are all excluded, is skipped.
#[instrument(skip_all, fields(tree = %tree.display(), profile = %options.profile.name, jobs = options.jobs))]
pub async fn execute<K: Kernel>(tree: &Path, options: &ExecuteOptions, kernel: Arc<K>) -> Result<CiReport> {
    if !tree.is_dir() {
        return Err(PublishError::execution(
            tree.display().to_string(),
            "artifact tree does not exist; run build first",
        ));
    }

    let notebooks: Vec<PathBuf> = walk_files(tree)?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "ipynb"))
        .filter(|p| !is_hidden(p))
        .collect();

    info!(notebooks = notebooks.len(), "starting CI run");

    let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut pending = Vec::with_capacity(notebooks.len());

    for rel in &notebooks {
        let id = notebook_id(rel);
        match plan(tree, rel, &options.profile) {
            Err(e) => {
                pending.push((id, Pending::Done(RunStatus::Failed { message: e.to_string() })));
            }
            Ok(Plan::Skip(reason)) => {
                debug!(%id, %reason, "skipping notebook");
                pending.push((id, Pending::Done(RunStatus::Skipped { reason })));
            }
            Ok(Plan::Run(scratch)) => {
                let kernel = Arc::clone(&kernel);
                let sem = Arc::clone(&semaphore);
                let timeout = options.timeout;
                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let started = Instant::now();
                    let status = match tokio::time::timeout(timeout, kernel.run(&scratch)).await {
                        Ok(Ok(())) => RunStatus::Passed,
                        Ok(Err(PublishError::Execution { message, .. })) => RunStatus::Failed { message },
                        Ok(Err(e)) => RunStatus::Failed { message: e.to_string() },
                        Err(_) => RunStatus::TimedOut,
                    };
                    let _ = std::fs::remove_file(&scratch);
                    (status, started.elapsed())
                });
                pending.push((id, Pending::Running(handle)));
            }
        }
    }

    let mut runs = Vec::with_capacity(pending.len());
    for (id, job) in pending {
        let (status, duration) = match job {
            Pending::Done(status) => (status, Duration::ZERO),
            Pending::Running(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => (
                    RunStatus::Failed {
                        message: format!("executor task failed: {e}"),
                    },
                    Duration::ZERO,
                ),
            },
        };
        match &status {
            RunStatus::Failed { message } => warn!(%id, %message, "notebook failed"),
            RunStatus::TimedOut => warn!(%id, timeout_secs = options.timeout.as_secs(), "notebook timed out"),
            other => info!(%id, ?other, elapsed_ms = duration.as_millis() as u64, "notebook finished"),
        }
        runs.push(NotebookRun { id, status, duration });
    }

    let report = CiReport {
        profile: options.profile.name.clone(),
        runs,
    };
    let (passed, failed, timed_out, skipped) = report.counts();
    info!(passed, failed, timed_out, skipped, "CI run complete");
    Ok(report)
}

enum Pending {
    Done(RunStatus),
    Running(tokio::task::JoinHandle<(RunStatus, Duration)>),
}

/// Decide whether to run a notebook and, if so, write its filtered scratch copy.
fn plan(tree: &Path, rel: &Path, profile: &BuildProfile) -> Result<Plan> {
    let doc = NotebookDocument::read(&tree.join(rel))?;

    if let Some(tag) = doc.notebook_tags().into_iter().find(|t| profile.excludes(t)) {
        return Ok(Plan::Skip(format!("notebook tagged '{tag}'")));
    }

    let filtered = filter_cells(&doc, &profile.excluded_tags);
    let had_code = doc.cells.iter().any(|c| c.is_code());
    let has_code = filtered.document.cells.iter().any(|c| c.is_code());
    if had_code && !has_code {
        return Ok(Plan::Skip("all code cells excluded by profile".into()));
    }

    let file_name = rel
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let scratch = tree
        .join(rel)
        .with_file_name(format!(".{file_name}.ci-{}.ipynb", uuid::Uuid::now_v7()));
    write_atomic(&scratch, &filtered.document.to_json_bytes()?)?;
    Ok(Plan::Run(scratch))
}

fn notebook_id(rel: &Path) -> String {
    rel.with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Dot-prefixed files and anything inside dot-prefixed directories
/// (`.ipynb_checkpoints`, scratch copies).
fn is_hidden(rel: &Path) -> bool {
    rel.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
