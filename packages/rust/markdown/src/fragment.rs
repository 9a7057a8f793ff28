//! Website fragment rendering.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use nbpublish_notebook::NotebookDocument;
use nbpublish_shared::TAG_WEB_INCLUDE;

static PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)---\r?\npermalink:.*?<!-- END PREAMBLE -->").expect("valid regex")
});

static WEB_REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!-- BEGIN WEB CONTENT -->.*?<!-- END WEB CONTENT -->").expect("valid regex")
});

static WEB_SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!-- SOURCE \(web content\): (.*?) -->").expect("valid regex")
});

/// Result of filling a text's web region from another document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// The target with its first web region replaced.
    Replaced(String),
    /// The source document marks no web region.
    SourceMissingRegion,
    /// The target marks no web region to replace.
    TargetMissingRegion,
}

/// Render markdown cells and `web-include` code cells as one Markdown text.
pub fn render_fragment(doc: &NotebookDocument) -> String {
    let language = code_language(doc);
    let mut blocks = Vec::new();

    for cell in &doc.cells {
        if cell.is_markdown() {
            blocks.push(cell.source.trim_end().to_string());
        } else if cell.is_code() && cell.has_tag(TAG_WEB_INCLUDE) {
            blocks.push(format!("```{language}\n{}\n```", cell.source.trim_end()));
        }
    }

    blocks.join("\n\n")
}

/// The notebook's language, for fenced code blocks.
fn code_language(doc: &NotebookDocument) -> &str {
    doc.metadata
        .get("language_info")
        .and_then(|info| info.get("name"))
        .or_else(|| doc.metadata.get("kernelspec").and_then(|k| k.get("language")))
        .and_then(Value::as_str)
        .unwrap_or("python")
}

/// The Jekyll front-matter preamble, from `---\npermalink:` through `<!-- END PREAMBLE -->`.
pub fn extract_preamble(md: &str) -> Option<&str> {
    PREAMBLE_RE.find(md).map(|m| m.as_str())
}

/// Every `BEGIN/END WEB CONTENT` region, markers included, in document order.
pub fn extract_web_regions(md: &str) -> Vec<&str> {
    WEB_REGION_RE.find_iter(md).map(|m| m.as_str()).collect()
}

/// Reduce a rendered fragment to its preamble and web regions.
///
/// Returns `None` when the text marks no web regions.
pub fn select_web_content(md: &str) -> Option<String> {
    let regions = extract_web_regions(md);
    if regions.is_empty() {
        return None;
    }

    let mut parts = Vec::with_capacity(regions.len() + 1);
    if let Some(preamble) = extract_preamble(md) {
        parts.push(preamble);
    }
    parts.extend(regions);
    Some(parts.join("\n\n"))
}

/// The reference named by a `<!-- SOURCE (web content): … -->` marker, if any.
pub fn web_source_reference(md: &str) -> Option<&str> {
    WEB_SOURCE_RE
        .captures(md)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|r| !r.is_empty())
}

/// Replace the first web region of `target` with the first web region of `source`.
pub fn inject_web_content(target: &str, source: &str) -> Injection {
    let Some(region) = WEB_REGION_RE.find(source) else {
        return Injection::SourceMissingRegion;
    };
    let Some(slot) = WEB_REGION_RE.find(target) else {
        return Injection::TargetMissingRegion;
    };

    let mut out = String::with_capacity(target.len() + region.len());
    out.push_str(&target[..slot.start()]);
    out.push_str(region.as_str());
    out.push_str(&target[slot.end()..]);
    Injection::Replaced(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbpublish_notebook::Cell;

    #[test]
    fn renders_markdown_and_included_code() {
        let doc = NotebookDocument::new(vec![
            Cell::markdown("# Title\n"),
            Cell::code("hidden = 1"),
            Cell::code("shown = 2\n").with_tags(["web-include"]),
            Cell::markdown("End"),
        ]);
        assert_eq!(
            render_fragment(&doc),
            "# Title\n\n```python\nshown = 2\n```\n\nEnd"
        );
    }

    #[test]
    fn fence_language_from_metadata() {
        let mut doc = NotebookDocument::new(vec![Cell::code("x").with_tags(["web-include"])]);
        doc.metadata.insert(
            "language_info".into(),
            serde_json::json!({"name": "julia"}),
        );
        assert!(render_fragment(&doc).starts_with("```julia\n"));
    }

    #[test]
    fn selects_preamble_and_regions() {
        let md = "---\npermalink: /tutorials/intro/\n---\n<!-- END PREAMBLE -->\n\nskip me\n\n<!-- BEGIN WEB CONTENT -->\nA\n<!-- END WEB CONTENT -->\nnot this\n<!-- BEGIN WEB CONTENT -->\nB\n<!-- END WEB CONTENT -->";
        let out = select_web_content(md).unwrap();
        assert_eq!(
            out,
            "---\npermalink: /tutorials/intro/\n---\n<!-- END PREAMBLE -->\n\n<!-- BEGIN WEB CONTENT -->\nA\n<!-- END WEB CONTENT -->\n\n<!-- BEGIN WEB CONTENT -->\nB\n<!-- END WEB CONTENT -->"
        );
    }

    #[test]
    fn no_regions_yields_none() {
        assert!(select_web_content("# Just a page").is_none());
        assert!(extract_preamble("# Just a page").is_none());
    }

    #[test]
    fn source_marker_reference_found() {
        let md = "intro\n<!-- SOURCE (web content): docs/page.md -->\nrest";
        assert_eq!(web_source_reference(md), Some("docs/page.md"));
        assert_eq!(web_source_reference("<!-- SOURCE (web content):  -->"), None);
        assert_eq!(web_source_reference("no marker"), None);
    }

    #[test]
    fn web_region_spliced_from_source() {
        let target = "<!-- SOURCE (web content): a.md -->\n<!-- BEGIN WEB CONTENT -->\nstale\n<!-- END WEB CONTENT -->\ntail";
        let source = "header\n<!-- BEGIN WEB CONTENT -->\nfresh\n<!-- END WEB CONTENT -->\nfooter";
        assert_eq!(
            inject_web_content(target, source),
            Injection::Replaced(
                "<!-- SOURCE (web content): a.md -->\n<!-- BEGIN WEB CONTENT -->\nfresh\n<!-- END WEB CONTENT -->\ntail"
                    .to_string()
            )
        );
        assert_eq!(inject_web_content(target, "no region"), Injection::SourceMissingRegion);
        assert_eq!(inject_web_content("no region", source), Injection::TargetMissingRegion);
    }
}
