//! Destination-specific finishing passes.
//!
//! Each [`DestinationKind`] maps to exactly one [`Finisher`]. Finishers receive
//! a document that has already been tag-filtered and path-rewritten and turn
//! it into the final artifact bytes.

mod ci;
mod nexus;
mod website;

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Value, json};

use nbpublish_markdown::passes::{self, headings, missing_sections};
use nbpublish_notebook::{Cell, NotebookDocument};
use nbpublish_shared::{DestinationKind, Result, TAG_NEXUS_ONLY, Warning};

use crate::manifest::{DestinationSpec, ManifestEntry};

pub use ci::CiFinisher;
pub use nexus::NexusFinisher;
pub use website::WebsiteFinisher;

/// Notebook metadata key recording where a derived notebook came from.
pub const METADATA_KEY: &str = "nbpublish";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// What a finisher knows about the artifact it is producing.
#[derive(Debug, Clone, Copy)]
pub struct FinishContext<'a> {
    pub entry: &'a ManifestEntry,
    pub destination: &'a DestinationSpec,
}

/// Finished artifact content.
#[derive(Debug, Clone)]
pub struct Finished {
    pub bytes: Vec<u8>,
    pub warnings: Vec<Warning>,
}

/// Final pass for one destination kind.
pub trait Finisher: Send + Sync {
    /// The kind this finisher handles.
    fn kind(&self) -> DestinationKind;

    /// Produce artifact bytes from a filtered, rewritten document.
    fn finish(&self, doc: NotebookDocument, ctx: &FinishContext<'_>) -> Result<Finished>;
}

/// The finisher for `kind`.
pub fn finisher_for(kind: DestinationKind) -> &'static dyn Finisher {
    match kind {
        DestinationKind::Website => &WebsiteFinisher,
        DestinationKind::NexusBuild => &NexusFinisher,
        DestinationKind::CiBuild => &CiFinisher,
    }
}

// ---------------------------------------------------------------------------
// Activation cells
// ---------------------------------------------------------------------------

static NEXUS_ONLY_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#\s*NEXUS-ONLY\b").expect("valid regex"));

static SOURCE_MAGIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*%source\b").expect("valid regex"));

static KERNEL_ACTIVATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bkernel-activate\b").expect("valid regex"));

/// A code cell that only works on the Nexus platform.
pub fn is_activation_cell(cell: &Cell) -> bool {
    cell.is_code()
        && (cell.has_tag(TAG_NEXUS_ONLY)
            || NEXUS_ONLY_COMMENT_RE.is_match(&cell.source)
            || SOURCE_MAGIC_RE.is_match(&cell.source)
            || KERNEL_ACTIVATE_RE.is_match(&cell.source))
}

// ---------------------------------------------------------------------------
// Shared notebook finishing
// ---------------------------------------------------------------------------

/// Passes shared by the notebook kinds, driven by destination options.
fn finish_notebook(doc: &mut NotebookDocument, ctx: &FinishContext<'_>, warnings: &mut Vec<Warning>) {
    let options = &ctx.destination.options;

    if options.clear_outputs {
        doc.cells.iter_mut().for_each(Cell::clear_outputs);
    }

    if options.replace_purple_hr {
        for cell in doc.cells.iter_mut().filter(|c| c.is_markdown()) {
            cell.source = passes::replace_purple_hr(&cell.source);
        }
    }

    if let Some(footer) = &options.footer {
        insert_footer(doc, footer);
    }

    if let Some(kernelspec) = &options.kernelspec {
        let value = serde_json::to_value(kernelspec).unwrap_or(Value::Null);
        doc.metadata.insert("kernelspec".into(), value);
    }

    if options.record_metadata {
        doc.metadata.insert(METADATA_KEY.into(), provenance(ctx));
    }

    let found: Vec<String> = doc
        .cells
        .iter()
        .filter(|c| c.is_markdown())
        .flat_map(|c| headings(&c.source))
        .collect();
    warnings.extend(
        missing_sections(&found, &options.required_sections)
            .into_iter()
            .map(|s| Warning::doc(format!("missing required section '{s}'"))),
    );
}

/// Replace the footer block in the first markdown cell that has one, or
/// append the footer as a new markdown cell.
fn insert_footer(doc: &mut NotebookDocument, footer: &str) {
    for cell in doc.cells.iter_mut().filter(|c| c.is_markdown()) {
        if let Some(replaced) = passes::replace_footer(&cell.source, footer) {
            cell.source = replaced;
            return;
        }
    }
    doc.cells
        .push(Cell::markdown(footer.trim_end_matches('\n').to_string()));
}

fn provenance(ctx: &FinishContext<'_>) -> Value {
    let entry = ctx.entry;
    json!({
        "source_id": entry.id,
        "session": entry.session,
        "audiences": entry.audiences,
        "nexus_support": entry.nexus_support,
        "destination": ctx.destination.kind.as_str(),
    })
}

/// nbformat JSON for `.ipynb` outputs, the concatenated cell text otherwise.
fn encode_notebook(doc: &NotebookDocument, output_path: &Path) -> Result<Vec<u8>> {
    let is_notebook = output_path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("ipynb"));
    if is_notebook {
        doc.to_json_bytes()
    } else {
        Ok(doc.plain_text().into_bytes())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{destination, entry};
    use super::*;

    #[test]
    fn finisher_lookup_matches_kind() {
        for kind in DestinationKind::ALL {
            assert_eq!(finisher_for(kind).kind(), kind);
        }
    }

    #[test]
    fn detects_activation_cells() {
        assert!(is_activation_cell(&Cell::code("%source kernel-activate rges-pit-dc")));
        assert!(is_activation_cell(&Cell::code("# NEXUS-ONLY\nimport nexus")));
        assert!(is_activation_cell(&Cell::code("x = 1").with_tags(["nexus-only"])));
        assert!(!is_activation_cell(&Cell::code("# nexus docs are online\nx = 1")));
        assert!(!is_activation_cell(&Cell::markdown("%source kernel-activate")));
    }

    #[test]
    fn shared_finishing_applies_options() {
        let entry = entry("intro");
        let mut dest = destination(DestinationKind::CiBuild, "intro.ipynb");
        dest.options.replace_purple_hr = true;
        dest.options.footer = Some("<!-- Footer Start -->\nnew\n<!-- Footer End -->\n".into());
        dest.options.required_sections = vec!["Learning Goals".into(), "Exercises".into()];
        let ctx = FinishContext { entry: &entry, destination: &dest };

        let mut out = Cell::code("print(1)");
        out.outputs.push(json!({"output_type": "stream"}));
        out.execution_count = Some(4);
        let mut doc = NotebookDocument::new(vec![
            Cell::markdown("## Learning Goals\n<hr style=\"color:#a859e4\">"),
            out,
        ]);

        let mut warnings = Vec::new();
        finish_notebook(&mut doc, &ctx, &mut warnings);

        assert!(doc.cells[1].outputs.is_empty());
        assert_eq!(doc.cells[1].execution_count, None);
        assert!(doc.cells[0].source.ends_with("***"));
        assert_eq!(doc.cells.len(), 3);
        assert!(doc.cells[2].source.contains("new"));
        assert_eq!(doc.metadata[METADATA_KEY]["source_id"], "intro");
        assert_eq!(doc.metadata[METADATA_KEY]["destination"], "ci_build");
        assert_eq!(warnings, vec![Warning::doc("missing required section 'Exercises'")]);
    }

    #[test]
    fn footer_replaced_in_existing_cell() {
        let mut doc = NotebookDocument::new(vec![Cell::markdown(
            "Body\n<!-- Footer Start -->\nold\n<!-- Footer End -->",
        )]);
        insert_footer(&mut doc, "<!-- Footer Start -->\nnew\n<!-- Footer End -->\n");
        assert_eq!(doc.cells.len(), 1);
        assert_eq!(
            doc.cells[0].source,
            "Body\n<!-- Footer Start -->\nnew\n<!-- Footer End -->"
        );
    }

    #[test]
    fn non_notebook_output_is_plain_text() {
        let doc = NotebookDocument::new(vec![Cell::code("def f():\n    pass\n")]);
        let bytes = encode_notebook(&doc, Path::new("utils/helpers.py")).unwrap();
        assert_eq!(bytes, b"def f():\n    pass\n");
        let bytes = encode_notebook(&doc, Path::new("a.ipynb")).unwrap();
        assert!(bytes.starts_with(b"{"));
    }
}
