//! Nexus-ready notebook build.

use nbpublish_notebook::NotebookDocument;
use nbpublish_shared::{DestinationKind, Result, TAG_CI_SKIP};
use tracing::debug;

use super::{FinishContext, Finished, Finisher, encode_notebook, finish_notebook, is_activation_cell};

/// Keeps activation cells verbatim and marks them so CI never runs them.
pub struct NexusFinisher;

impl Finisher for NexusFinisher {
    fn kind(&self) -> DestinationKind {
        DestinationKind::NexusBuild
    }

    fn finish(&self, mut doc: NotebookDocument, ctx: &FinishContext<'_>) -> Result<Finished> {
        let mut warnings = Vec::new();

        for (index, cell) in doc.cells.iter_mut().enumerate() {
            if is_activation_cell(cell) && !cell.has_tag(TAG_CI_SKIP) {
                cell.add_tag(TAG_CI_SKIP);
                debug!(id = %ctx.entry.id, cell = index, "tagged activation cell ci-skip");
            }
        }

        finish_notebook(&mut doc, ctx, &mut warnings);
        let bytes = encode_notebook(&doc, &ctx.destination.output_path)?;
        Ok(Finished { bytes, warnings })
    }
}
