//! Notebook document model, source loading, and the cell tag filter.
//!
//! This crate provides:
//! - [`NotebookDocument`] / [`Cell`]: an nbformat 4 notebook that round-trips
//!   unknown metadata and serializes deterministically
//! - [`load_source`]: loads `.ipynb`, `.py` and `.md` canonical sources
//! - [`filter`]: drops cells whose tags intersect an excluded set

mod document;
pub mod filter;

pub use document::{Cell, CellType, NotebookDocument, load_source};
pub use filter::{DroppedCell, Filtered, filter, filter_cells};
