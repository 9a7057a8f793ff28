//! Cell tag filter.
//!
//! A cell whose tags intersect the excluded set is dropped entirely, so the
//! surviving cells stay contiguous and keep their relative order. Filtering is
//! idempotent and an empty result is a valid notebook.

use std::collections::BTreeSet;

use crate::document::NotebookDocument;

/// A cell removed by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedCell {
    /// Index of the cell in the input document.
    pub index: usize,
    /// The excluded tags the cell carried.
    pub matched_tags: Vec<String>,
}

/// Filter output: the surviving document plus what was dropped.
#[derive(Debug, Clone)]
pub struct Filtered {
    pub document: NotebookDocument,
    pub dropped: Vec<DroppedCell>,
    /// Input index of each surviving cell, in output order.
    pub kept: Vec<usize>,
}

impl Filtered {
    /// Map an index in the filtered document back to the input document.
    pub fn source_index(&self, filtered_index: usize) -> usize {
        self.kept.get(filtered_index).copied().unwrap_or(filtered_index)
    }
}

/// Drop every cell carrying a tag in `excluded_tags`.
pub fn filter(doc: &NotebookDocument, excluded_tags: &BTreeSet<String>) -> NotebookDocument {
    filter_cells(doc, excluded_tags).document
}

/// Like [`filter`], also reporting which cells were dropped and why.
pub fn filter_cells(doc: &NotebookDocument, excluded_tags: &BTreeSet<String>) -> Filtered {
    let mut document = doc.clone();
    let mut dropped = Vec::new();
    let mut kept = Vec::with_capacity(doc.cells.len());

    if excluded_tags.is_empty() {
        kept.extend(0..doc.cells.len());
        return Filtered { document, dropped, kept };
    }

    let mut index = 0;
    document.cells.retain(|cell| {
        let matched: Vec<String> = cell
            .tags()
            .into_iter()
            .filter(|tag| excluded_tags.contains(*tag))
            .map(String::from)
            .collect();
        let keep = matched.is_empty();
        if keep {
            kept.push(index);
        } else {
            dropped.push(DroppedCell {
                index,
                matched_tags: matched,
            });
        }
        index += 1;
        keep
    });

    Filtered { document, dropped, kept }
}
