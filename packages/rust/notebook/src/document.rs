//! nbformat 4 document model.
//!
//! Only the fields the pipeline reasons about are typed; everything else in
//! notebook and cell metadata is carried as opaque JSON so derived builds
//! keep what authors wrote.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use nbpublish_shared::{PublishError, Result};

/// Default nbformat major version for synthesized notebooks.
const NBFORMAT: u32 = 4;

/// Default nbformat minor version for synthesized notebooks.
const NBFORMAT_MINOR: u32 = 5;

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

/// The kind of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

/// A single notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCell", into = "RawCell")]
pub struct Cell {
    pub cell_type: CellType,
    /// nbformat 4.5 cell id, when present.
    pub id: Option<String>,
    /// Cell metadata, including the `tags` list.
    pub metadata: Map<String, Value>,
    /// Full cell source as one string.
    pub source: String,
    /// Code cell outputs (empty for other cell types).
    pub outputs: Vec<Value>,
    /// Code cell execution count.
    pub execution_count: Option<u64>,
    /// Markdown cell attachments.
    pub attachments: Option<Value>,
}

impl Cell {
    /// A new code cell with no tags.
    pub fn code(source: impl Into<String>) -> Self {
        Self::new(CellType::Code, source)
    }

    /// A new markdown cell with no tags.
    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new(CellType::Markdown, source)
    }

    fn new(cell_type: CellType, source: impl Into<String>) -> Self {
        Self {
            cell_type,
            id: None,
            metadata: Map::new(),
            source: source.into(),
            outputs: Vec::new(),
            execution_count: None,
            attachments: None,
        }
    }

    /// Builder-style tag addition.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            self.add_tag(tag.as_ref());
        }
        self
    }

    /// Whether this is a code cell.
    pub fn is_code(&self) -> bool {
        self.cell_type == CellType::Code
    }

    /// Whether this is a markdown cell.
    pub fn is_markdown(&self) -> bool {
        self.cell_type == CellType::Markdown
    }

    /// The cell's tags, in authored order. Non-string entries are ignored.
    pub fn tags(&self) -> Vec<&str> {
        tag_list(&self.metadata)
    }

    /// Tags are case-sensitive opaque strings.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().contains(&tag)
    }

    /// Append a tag unless already present.
    pub fn add_tag(&mut self, tag: &str) {
        if self.has_tag(tag) {
            return;
        }
        let entry = self
            .metadata
            .entry("tags")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(items) = entry {
            items.push(Value::String(tag.to_string()));
        }
    }

    /// Drop outputs and execution counts.
    pub fn clear_outputs(&mut self) {
        self.outputs.clear();
        self.execution_count = None;
    }
}

fn tag_list(metadata: &Map<String, Value>) -> Vec<&str> {
    metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// On-disk shape of a cell. Fields are declared in sorted order so serialized
/// output matches nbformat's own `sort_keys` layout.
#[derive(Serialize, Deserialize)]
struct RawCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachments: Option<Value>,
    cell_type: CellType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    execution_count: Option<Option<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outputs: Option<Vec<Value>>,
    #[serde(default)]
    source: MultilineText,
}

/// nbformat allows `source` as either one string or a list of lines.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MultilineText {
    One(String),
    Lines(Vec<String>),
}

impl Default for MultilineText {
    fn default() -> Self {
        Self::Lines(Vec::new())
    }
}

impl From<RawCell> for Cell {
    fn from(raw: RawCell) -> Self {
        let source = match raw.source {
            MultilineText::One(s) => s,
            MultilineText::Lines(lines) => lines.concat(),
        };
        Self {
            cell_type: raw.cell_type,
            id: raw.id,
            metadata: raw.metadata,
            source,
            outputs: raw.outputs.unwrap_or_default(),
            execution_count: raw.execution_count.flatten(),
            attachments: raw.attachments,
        }
    }
}

impl From<Cell> for RawCell {
    fn from(cell: Cell) -> Self {
        let is_code = cell.is_code();
        let lines = cell.source.split_inclusive('\n').map(String::from).collect();
        Self {
            attachments: cell.attachments,
            cell_type: cell.cell_type,
            execution_count: is_code.then_some(cell.execution_count),
            id: cell.id,
            metadata: cell.metadata,
            outputs: is_code.then_some(cell.outputs),
            source: MultilineText::Lines(lines),
        }
    }
}

// ---------------------------------------------------------------------------
// NotebookDocument
// ---------------------------------------------------------------------------

/// An ordered sequence of cells plus notebook-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookDocument {
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
}

fn default_nbformat() -> u32 {
    NBFORMAT
}
fn default_nbformat_minor() -> u32 {
    NBFORMAT_MINOR
}

impl Default for NotebookDocument {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl NotebookDocument {
    /// A notebook with the given cells and empty metadata.
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: NBFORMAT,
            nbformat_minor: NBFORMAT_MINOR,
        }
    }

    /// Parse a notebook from nbformat JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PublishError::parse(format!("invalid notebook JSON: {e}")))
    }

    /// Serialize to nbformat JSON: one-space indent, sorted keys, trailing newline.
    ///
    /// Identical documents always produce identical bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)
            .map_err(|e| PublishError::parse(format!("notebook serialization failed: {e}")))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Read an `.ipynb` file.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PublishError::io(path, e))?;
        Self::from_json_str(&content).map_err(|e| match e {
            PublishError::Parse { message } => {
                PublishError::parse(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Notebook-level tags (`metadata.tags`), used for whole-notebook skips.
    pub fn notebook_tags(&self) -> Vec<&str> {
        tag_list(&self.metadata)
    }

    /// Concatenate cell sources with blank-line separators.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for cell in &self.cells {
            if !out.is_empty() {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(&cell.source);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Source loading
// ---------------------------------------------------------------------------

/// Load a canonical source as a notebook document.
///
/// - `.ipynb` is parsed as nbformat JSON
/// - `.md` becomes a single markdown cell
/// - `.rst` and `.txt` become a single markdown cell showing the raw text in a fence
/// - anything else (`.py` helper modules, scripts) becomes a single code cell
pub fn load_source(path: &Path) -> Result<NotebookDocument> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if ext == "ipynb" {
        return NotebookDocument::read(path);
    }

    let text = std::fs::read_to_string(path).map_err(|e| PublishError::io(path, e))?;
    let cell = match ext.as_str() {
        "md" => Cell::markdown(text),
        "rst" | "txt" => Cell::markdown(fenced_text(path, &text)),
        _ => Cell::code(text),
    };
    debug!(path = %path.display(), ext, "wrapped text source as single-cell notebook");
    Ok(NotebookDocument::new(vec![cell]))
}

/// Render plain text as a titled markdown page with the body in a `text` fence.
fn fenced_text(path: &Path, text: &str) -> String {
    let title = path.file_stem().and_then(|s| s.to_str()).unwrap_or("Notebook Content");
    let mut out = format!("# {title}\n\n```text\n{text}");
    if !text.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
