//! Content transformer: filter, rewrite, finish.
//!
//! A pure function of its inputs. Identical inputs always produce identical
//! bytes, which is what lets trees be deleted and regenerated freely.

use std::path::PathBuf;

use tracing::{debug, instrument};

use nbpublish_markdown::rewrite;
use nbpublish_notebook::{NotebookDocument, filter_cells};
use nbpublish_shared::{
    BuildProfile, DestinationKind, PublishError, Result, TAG_COLAB_ONLY, TAG_NEXUS_ONLY, Warning,
};

use crate::finish::{FinishContext, finisher_for};
use crate::manifest::{DestinationSpec, ManifestEntry};

/// One finished output file.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub entry_id: String,
    pub kind: DestinationKind,
    /// Relative to the tree root of `kind`.
    pub relative_path: PathBuf,
    pub bytes: Vec<u8>,
    pub warnings: Vec<Warning>,
}

/// Derive one artifact from a canonical document.
///
/// Cells tagged with any of the profile's excluded tags are dropped, as are
/// `colab-only` cells and, for every destination except the Nexus build,
/// `nexus-only` cells. Cell indices in warnings refer to `doc`.
#[instrument(skip_all, fields(id = %entry.id, kind = %destination.kind, profile = %profile.name))]
pub fn transform(
    doc: &NotebookDocument,
    entry: &ManifestEntry,
    destination: &DestinationSpec,
    profile: &BuildProfile,
) -> Result<Artifact> {
    let mut excluded = profile.excluded_tags.clone();
    excluded.insert(TAG_COLAB_ONLY.to_string());
    if destination.kind != DestinationKind::NexusBuild {
        excluded.insert(TAG_NEXUS_ONLY.to_string());
    }

    let filtered = filter_cells(doc, &excluded);
    let mut warnings: Vec<Warning> = filtered
        .dropped
        .iter()
        .map(|d| Warning::cell(d.index, format!("dropped cell tagged {}", d.matched_tags.join(", "))))
        .collect();

    let rewritten = rewrite(&filtered.document, &destination.rules);
    debug!(
        dropped = filtered.dropped.len(),
        rewritten = rewritten.rewritten,
        "filtered and rewrote document"
    );
    let to_source = |w: Warning| Warning {
        cell: w.cell.map(|i| filtered.source_index(i)),
        ..w
    };
    warnings.extend(rewritten.warnings.into_iter().map(to_source));

    let ctx = FinishContext { entry, destination };
    let finisher = finisher_for(destination.kind);
    let finished = finisher
        .finish(rewritten.document, &ctx)
        .map_err(|e| {
            PublishError::transform(&entry.id, format!("{} finishing failed: {e}", finisher.kind()))
        })?;
    warnings.extend(finished.warnings.into_iter().map(to_source));

    Ok(Artifact {
        entry_id: entry.id.clone(),
        kind: destination.kind,
        relative_path: destination.output_path.clone(),
        bytes: finished.bytes,
        warnings,
    })
}
