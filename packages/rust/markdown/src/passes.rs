//! Text passes for published Markdown and notebook prose.
//!
//! Each pass is a function `&str -> String`. [`finish_page`] runs the website
//! pipeline; the remaining passes are applied per cell by the notebook
//! finishers.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Start marker of a replaceable footer block.
pub const FOOTER_START: &str = "<!-- Footer Start -->";

/// End marker of a replaceable footer block.
pub const FOOTER_END: &str = "<!-- Footer End -->";

/// Jekyll expression prefixed to links that point back into the site.
const SITE_PREFIX: &str = "{{ site.url }}{{ site.baseurl }}";

/// Run the website page pipeline on a rendered fragment.
pub fn finish_page(md: &str, site_url: Option<&Url>) -> String {
    let mut result = md.to_string();

    if let Some(site) = site_url {
        result = localize_site_links(&result, site);
    }
    result = mark_external_links(&result);
    result = outside_fences(&result, clean_blank_lines);
    result = outside_fences(&result, normalize_whitespace);
    result = ensure_trailing_newline(&result);

    result
}

/// Apply `f` to every run of lines outside fenced code blocks.
fn outside_fences(md: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(md.len());
    let mut prose = String::new();
    let mut in_code_block = false;

    for line in md.split_inclusive('\n') {
        let is_fence = line.trim_start().starts_with("```");
        if in_code_block {
            out.push_str(line);
            if is_fence {
                in_code_block = false;
            }
            continue;
        }
        if is_fence {
            out.push_str(&f(&prose));
            prose.clear();
            out.push_str(line);
            in_code_block = true;
            continue;
        }
        prose.push_str(line);
    }
    out.push_str(&f(&prose));
    out
}

// ---------------------------------------------------------------------------
// Pass: localize links into the site
// ---------------------------------------------------------------------------

static SITE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\]\(|\bhref\s*=\s*")(https?://[^)"\s]+)"#).expect("valid regex")
});

/// Rewrite absolute links under `site` to `{{ site.url }}{{ site.baseurl }}/path`.
pub fn localize_site_links(md: &str, site: &Url) -> String {
    let base = site.as_str().trim_end_matches('/');

    outside_fences(md, |text| {
        SITE_LINK_RE
            .replace_all(text, |caps: &Captures| {
                let opener = &caps[1];
                let target = &caps[2];
                match target.strip_prefix(base) {
                    Some(rest) if rest.is_empty() || rest.starts_with(['/', '#', '?']) => {
                        let path = if rest.starts_with('/') {
                            rest.to_string()
                        } else {
                            format!("/{rest}")
                        };
                        format!("{opener}{SITE_PREFIX}{path}")
                    }
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    })
}

// ---------------------------------------------------------------------------
// Pass: open external links in a new tab
// ---------------------------------------------------------------------------

static EXTERNAL_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[([^\]\n]*)\]\((https?://[^)\s]+)\)(\{:[^}\n]*\})?").expect("valid regex")
});

/// Append `{:target="_blank"}` to external links that carry no attribute list.
///
/// Images are left alone.
pub fn mark_external_links(md: &str) -> String {
    outside_fences(md, |text| {
        EXTERNAL_LINK_RE
            .replace_all(text, |caps: &Captures| {
                let is_image = !caps[1].is_empty();
                let has_attrs = caps.get(4).is_some();
                if is_image || has_attrs {
                    caps[0].to_string()
                } else {
                    format!("{}{{:target=\"_blank\"}}", &caps[0])
                }
            })
            .into_owned()
    })
}

// ---------------------------------------------------------------------------
// Pass: purple horizontal rules
// ---------------------------------------------------------------------------

static PURPLE_HR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<hr[^>]*a859e4[^>]*>").expect("valid regex"));

/// Replace the styled purple `<hr>` used in source notebooks with a plain rule.
pub fn replace_purple_hr(text: &str) -> String {
    PURPLE_HR_RE.replace_all(text, "***").into_owned()
}

// ---------------------------------------------------------------------------
// Pass: footer
// ---------------------------------------------------------------------------

static FOOTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!-- Footer Start -->.*?<!-- Footer End -->").expect("valid regex")
});

/// Whether `text` contains a complete footer block.
pub fn has_footer(text: &str) -> bool {
    FOOTER_RE.is_match(text)
}

/// Replace the first footer block in `text` with `footer`.
///
/// Returns `None` when `text` has no footer block.
pub fn replace_footer(text: &str, footer: &str) -> Option<String> {
    let m = FOOTER_RE.find(text)?;
    let mut out = String::with_capacity(text.len() + footer.len());
    out.push_str(&text[..m.start()]);
    out.push_str(footer.trim_end_matches('\n'));
    out.push_str(&text[m.end()..]);
    Some(out)
}

// ---------------------------------------------------------------------------
// Pass: required sections
// ---------------------------------------------------------------------------

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t#]*$").expect("valid regex"));

/// Lowercased text of every ATX heading in `md`.
pub fn headings(md: &str) -> Vec<String> {
    HEADING_RE
        .captures_iter(md)
        .map(|caps| caps[1].trim().to_lowercase())
        .collect()
}

/// Required sections with no matching heading.
///
/// A heading matches when it contains the section name case-insensitively,
/// ignoring a trailing plural `s` ("Exercise 2" satisfies "Exercises").
pub fn missing_sections(found: &[String], required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|section| {
            let lowered = section.to_lowercase();
            let key = lowered.strip_suffix('s').unwrap_or(&lowered);
            !found.iter().any(|h| h.contains(key))
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Pass: whitespace
// ---------------------------------------------------------------------------

/// Collapse runs of 3+ blank lines into exactly 2.
pub fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n\n").into_owned()
}

/// Trim trailing whitespace on every line, keeping line endings.
///
/// Two or more trailing spaces after text are a Markdown hard line break and
/// are kept as exactly two.
pub fn normalize_whitespace(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    for line in md.split_inclusive('\n') {
        let (content, ending) = match line.strip_suffix('\n') {
            Some(body) => (body.strip_suffix('\r').unwrap_or(body), "\n"),
            None => (line, ""),
        };
        let trimmed = content.trim_end();
        out.push_str(trimmed);
        if !ending.is_empty() && !trimmed.is_empty() && content.ends_with("  ") {
            out.push_str("  ");
        }
        out.push_str(ending);
    }
    out
}

/// Ensure the text ends with exactly one newline.
pub fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Url {
        Url::parse("https://rges-pit.org/").unwrap()
    }

    #[test]
    fn external_link_gets_target() {
        let out = mark_external_links("See [docs](https://numpy.org/doc).");
        assert_eq!(out, "See [docs](https://numpy.org/doc){:target=\"_blank\"}.");
    }

    #[test]
    fn external_link_marking_is_idempotent() {
        let once = mark_external_links("[a](https://x.org)");
        assert_eq!(mark_external_links(&once), once);
    }

    #[test]
    fn images_and_relative_links_untouched() {
        let input = "![plot](https://x.org/p.png) [local](../a.md)";
        assert_eq!(mark_external_links(input), input);
    }

    #[test]
    fn links_inside_fences_untouched() {
        let input = "```python\n# [a](https://x.org)\n```\n[b](https://y.org)\n";
        let out = mark_external_links(input);
        assert!(out.contains("# [a](https://x.org)\n"));
        assert!(out.contains("[b](https://y.org){:target=\"_blank\"}"));
    }

    #[test]
    fn site_links_localized() {
        let input = "[data](https://rges-pit.org/data/) and <a href=\"https://rges-pit.org/faq\">faq</a>";
        let out = localize_site_links(input, &site());
        assert_eq!(
            out,
            "[data]({{ site.url }}{{ site.baseurl }}/data/) and <a href=\"{{ site.url }}{{ site.baseurl }}/faq\">faq</a>"
        );
    }

    #[test]
    fn other_hosts_not_localized() {
        let input = "[x](https://rges-pit.org.evil.com/a) [y](https://other.org/)";
        assert_eq!(localize_site_links(input, &site()), input);
    }

    #[test]
    fn finish_page_localizes_before_marking() {
        let out = finish_page("[home](https://rges-pit.org/)\n\n\n\n\n[ext](https://x.org)   ", Some(&site()));
        assert_eq!(
            out,
            "[home]({{ site.url }}{{ site.baseurl }}/)\n\n\n[ext](https://x.org){:target=\"_blank\"}\n"
        );
    }

    #[test]
    fn purple_hr_replaced() {
        let input = "a\n<hr style=\"border-color:#A859E4\">\nb";
        assert_eq!(replace_purple_hr(input), "a\n***\nb");
        assert_eq!(replace_purple_hr("<hr>"), "<hr>");
    }

    #[test]
    fn footer_replaced_in_place() {
        let text = "intro\n<!-- Footer Start -->\nold\n<!-- Footer End -->\ntail";
        let footer = "<!-- Footer Start -->\nnew\n<!-- Footer End -->\n";
        assert_eq!(
            replace_footer(text, footer).unwrap(),
            "intro\n<!-- Footer Start -->\nnew\n<!-- Footer End -->\ntail"
        );
        assert!(replace_footer("no footer", footer).is_none());
        assert!(has_footer(footer));
        assert!(!has_footer("<!-- Footer Start --> only"));
    }

    #[test]
    fn missing_sections_matches_keywords() {
        let found = headings("# Title\n## Learning Goals\n### Exercise 1\n## About this Notebook ##\n");
        let required: Vec<String> = ["Learning Goals", "Exercises", "Additional Resources", "About this Notebook"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(missing_sections(&found, &required), vec!["Additional Resources".to_string()]);
    }

    #[test]
    fn clean_blank_lines_collapses_excess() {
        assert_eq!(clean_blank_lines("Line 1\n\n\n\n\nLine 2"), "Line 1\n\n\nLine 2");
        assert_eq!(clean_blank_lines("Line 1\n\nLine 2"), "Line 1\n\nLine 2");
    }

    #[test]
    fn whitespace_trimmed_but_hard_breaks_kept() {
        assert_eq!(normalize_whitespace("a \t\nb   \nc  "), "a\nb  \nc");
        assert_eq!(normalize_whitespace("   \nx\r\n"), "\nx\n");
    }

    #[test]
    fn page_passes_leave_fenced_code_alone() {
        let md = "Intro  \nnext\n\n```python\nx = 1   \n\n\n\n\ny = 2\n```\n\n\n\n\nOutro \t\n";
        let out = finish_page(md, None);
        assert_eq!(out, "Intro  \nnext\n\n```python\nx = 1   \n\n\n\n\ny = 2\n```\n\n\n\nOutro\n");
    }

    #[test]
    fn ensure_trailing_newline_normalizes() {
        assert_eq!(ensure_trailing_newline("Content"), "Content\n");
        assert_eq!(ensure_trailing_newline("Content\n\n\n"), "Content\n");
    }
}
