//! Path rewriter.
//!
//! Rewriting never runs over arbitrary prose: the source of each cell is
//! scanned for recognizable path tokens and only the byte ranges of those
//! tokens are replaced. Everything between tokens is copied through verbatim.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use nbpublish_notebook::{CellType, NotebookDocument};
use nbpublish_shared::{PublishError, Result, Warning};

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One `(pattern, replacement)` rule. The replacement may use `$1`-style
/// capture references.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Compile a rule; an invalid pattern is a manifest error.
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            PublishError::manifest(format!("invalid rewrite pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Apply this rule to a token value, or `None` if it does not match.
    fn apply(&self, value: &str) -> Option<String> {
        self.pattern
            .is_match(value)
            .then(|| self.pattern.replace(value, self.replacement.as_str()).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Token scanning
// ---------------------------------------------------------------------------

/// The syntax a path token was recognized in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `[text](target)` or `![alt](target)` in a markdown cell.
    Link,
    /// `src="…"` / `href="…"` in a markdown cell.
    Attribute,
    /// A quoted `./…` or `../…` string literal in a code cell.
    Literal,
    /// `import a.b` / `from a.b import c` in a code cell.
    Module,
}

/// A recognized path reference inside a cell source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathToken {
    pub kind: TokenKind,
    /// Byte offset of the value within the cell source.
    pub start: usize,
    /// Byte offset one past the value.
    pub end: usize,
    pub value: String,
}

impl PathToken {
    /// Whether an unmatched token should be reported as a possibly broken path.
    pub fn is_local_path(&self) -> bool {
        self.kind != TokenKind::Module
    }
}

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[[^\]\n]*\]\(\s*([^)\s]+)(?:\s+"[^"\n]*")?\s*\)"#).expect("valid regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:src|href)\s*=\s*(?:"([^"\n]+)"|'([^'\n]+)')"#).expect("valid regex")
});

static LITERAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(\.\.?/[^"\n]*)"|'(\.\.?/[^'\n]*)'"#).expect("valid regex")
});

static MODULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:from[ \t]+(\.*[A-Za-z_][\w.]*)[ \t]+import\b|import[ \t]+([A-Za-z_][\w.]*))")
        .expect("valid regex")
});

/// Find every path token in a cell source, ordered by position.
///
/// Absolute URLs, anchors, `mailto:`, absolute filesystem paths and template
/// expressions are not path tokens.
pub fn scan_tokens(cell_type: CellType, source: &str) -> Vec<PathToken> {
    let mut tokens = Vec::new();

    match cell_type {
        CellType::Markdown => {
            collect(&LINK_RE, TokenKind::Link, source, &mut tokens);
            collect(&ATTR_RE, TokenKind::Attribute, source, &mut tokens);
            tokens.retain(|t| is_relative_reference(&t.value));
        }
        CellType::Code => {
            collect(&LITERAL_RE, TokenKind::Literal, source, &mut tokens);
            collect(&MODULE_RE, TokenKind::Module, source, &mut tokens);
        }
        CellType::Raw => {}
    }

    tokens.sort_by_key(|t| t.start);

    // Keep the first token of any overlapping pair.
    let mut last_end = 0;
    tokens.retain(|t| {
        let keep = t.start >= last_end;
        if keep {
            last_end = t.end;
        }
        keep
    });

    tokens
}

fn collect(re: &Regex, kind: TokenKind, source: &str, out: &mut Vec<PathToken>) {
    for caps in re.captures_iter(source) {
        // The value is whichever alternative group participated.
        if let Some(m) = caps.iter().skip(1).flatten().next() {
            out.push(PathToken {
                kind,
                start: m.start(),
                end: m.end(),
                value: m.as_str().to_string(),
            });
        }
    }
}

fn is_relative_reference(value: &str) -> bool {
    if value.is_empty() || value.starts_with('#') || value.starts_with('/') {
        return false;
    }
    if value.starts_with("{{") || value.starts_with("{%") {
        return false;
    }
    // Anything with a scheme (http:, https:, mailto:, data:, ...) is absolute.
    Url::parse(value).is_err()
}

// ---------------------------------------------------------------------------
// Rewriting
// ---------------------------------------------------------------------------

/// Output of [`rewrite`].
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub document: NotebookDocument,
    /// Unmatched local paths, flagged rather than aborted.
    pub warnings: Vec<Warning>,
    /// Number of tokens changed.
    pub rewritten: usize,
}

/// Rewrite path tokens with the first matching rule.
///
/// An empty rule list means the destination keeps the source layout: the
/// document is returned untouched and nothing is flagged.
pub fn rewrite(doc: &NotebookDocument, rules: &[RewriteRule]) -> Rewritten {
    let mut document = doc.clone();
    let mut warnings = Vec::new();
    let mut rewritten = 0;

    if rules.is_empty() {
        return Rewritten {
            document,
            warnings,
            rewritten,
        };
    }

    for (index, cell) in document.cells.iter_mut().enumerate() {
        let tokens = scan_tokens(cell.cell_type, &cell.source);
        if tokens.is_empty() {
            continue;
        }

        let mut out = String::with_capacity(cell.source.len());
        let mut cursor = 0;

        for token in &tokens {
            out.push_str(&cell.source[cursor..token.start]);
            match rules.iter().find_map(|rule| rule.apply(&token.value)) {
                Some(replaced) => {
                    if replaced != token.value {
                        rewritten += 1;
                        debug!(cell = index, from = %token.value, to = %replaced, "rewrote path");
                    }
                    out.push_str(&replaced);
                }
                None => {
                    if token.is_local_path() {
                        warnings.push(Warning::cell(
                            index,
                            format!("path '{}' matches no rewrite rule", token.value),
                        ));
                    }
                    out.push_str(&token.value);
                }
            }
            cursor = token.end;
        }
        out.push_str(&cell.source[cursor..]);
        cell.source = out;
    }

    Rewritten {
        document,
        warnings,
        rewritten,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
