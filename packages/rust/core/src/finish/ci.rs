//! Portable build for generic CI kernels.

use nbpublish_notebook::NotebookDocument;
use nbpublish_shared::{DestinationKind, Result, Warning};
use tracing::debug;

use super::{FinishContext, Finished, Finisher, encode_notebook, finish_notebook, is_activation_cell};

/// Removes every activation cell so the notebook runs outside Nexus.
pub struct CiFinisher;

impl Finisher for CiFinisher {
    fn kind(&self) -> DestinationKind {
        DestinationKind::CiBuild
    }

    fn finish(&self, mut doc: NotebookDocument, ctx: &FinishContext<'_>) -> Result<Finished> {
        let mut warnings = Vec::new();

        let mut index = 0;
        doc.cells.retain(|cell| {
            let keep = !is_activation_cell(cell);
            if !keep {
                debug!(id = %ctx.entry.id, cell = index, "removed activation cell");
                warnings.push(Warning::cell(index, "removed Nexus activation cell"));
            }
            index += 1;
            keep
        });

        finish_notebook(&mut doc, ctx, &mut warnings);
        let bytes = encode_notebook(&doc, &ctx.destination.output_path)?;
        Ok(Finished { bytes, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finish::test_support::{destination, entry};
    use nbpublish_notebook::Cell;

    #[test]
    fn activation_cells_removed_with_warning() {
        let entry = entry("fit");
        let dest = destination(DestinationKind::CiBuild, "fit.ipynb");
        let ctx = FinishContext { entry: &entry, destination: &dest };
        let doc = NotebookDocument::new(vec![
            Cell::markdown("# Fit"),
            Cell::code("# NEXUS-ONLY\nfrom nexus import token"),
            Cell::code("fit()"),
        ]);

        let finished = CiFinisher.finish(doc, &ctx).unwrap();
        let out = NotebookDocument::from_json_str(std::str::from_utf8(&finished.bytes).unwrap()).unwrap();

        let sources: Vec<&str> = out.cells.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["# Fit", "fit()"]);
        assert_eq!(finished.warnings, vec![Warning::cell(1, "removed Nexus activation cell")]);
    }

    #[test]
    fn output_is_deterministic() {
        let entry = entry("fit");
        let dest = destination(DestinationKind::CiBuild, "fit.ipynb");
        let ctx = FinishContext { entry: &entry, destination: &dest };
        let doc = NotebookDocument::new(vec![Cell::code("a = 1\n"), Cell::markdown("b")]);

        let a = CiFinisher.finish(doc.clone(), &ctx).unwrap();
        let b = CiFinisher.finish(doc, &ctx).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }
}
