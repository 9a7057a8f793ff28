//! Notebook manifest: the single source of truth for what gets published where.
//!
//! The manifest is TOML. Paths inside it are relative to the manifest's own
//! directory, and `output_path`s are relative to the tree root of their kind.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use nbpublish_markdown::RewriteRule;
use nbpublish_markdown::passes::has_footer;
use nbpublish_shared::{DestinationKind, PublishError, Result};

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

/// Kernelspec written into derived notebooks in place of the source's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelspecOverride {
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Per-destination finishing options.
#[derive(Debug, Clone)]
pub struct DestinationOptions {
    pub clear_outputs: bool,
    pub record_metadata: bool,
    /// Footer template text, loaded with the manifest.
    pub footer: Option<String>,
    pub replace_purple_hr: bool,
    pub required_sections: Vec<String>,
    pub kernelspec: Option<KernelspecOverride>,
    pub site_url: Option<Url>,
    /// Fill web-content regions from the file named by a `<!-- SOURCE (web content): … -->` marker.
    pub inject_web_content: bool,
}

impl Default for DestinationOptions {
    fn default() -> Self {
        Self {
            clear_outputs: true,
            record_metadata: true,
            footer: None,
            replace_purple_hr: false,
            required_sections: Vec::new(),
            kernelspec: None,
            site_url: None,
            inject_web_content: false,
        }
    }
}

/// One output of an entry.
#[derive(Debug, Clone)]
pub struct DestinationSpec {
    pub kind: DestinationKind,
    /// Relative to the tree root of `kind`.
    pub output_path: PathBuf,
    /// Applied in order; first match wins per path token.
    pub rules: Vec<RewriteRule>,
    pub options: DestinationOptions,
}

/// One canonical source and where it goes.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub id: String,
    /// Absolute path of the canonical source.
    pub source_path: PathBuf,
    pub destinations: Vec<DestinationSpec>,
    pub nexus_support: bool,
    pub session: Option<String>,
    pub audiences: Vec<String>,
    pub upstream_url: Option<Url>,
}

impl ManifestEntry {
    /// This entry's destinations of one kind, in manifest order.
    pub fn destinations_of(&self, kind: DestinationKind) -> impl Iterator<Item = &DestinationSpec> {
        self.destinations.iter().filter(move |d| d.kind == kind)
    }
}

/// A loaded, validated manifest.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    root: PathBuf,
    trees: BTreeMap<DestinationKind, PathBuf>,
    repo_url: Option<Url>,
    entries: Vec<ManifestEntry>,
}

impl ManifestStore {
    /// Load and validate a manifest. Every `source_path` must exist.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, true)
    }

    /// Like [`ManifestStore::load`] without requiring sources to exist yet.
    pub fn load_lenient(path: &Path) -> Result<Self> {
        Self::load_with(path, false)
    }

    fn load_with(path: &Path, require_sources: bool) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PublishError::manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        let raw: RawManifest = toml::from_str(&content).map_err(|e| {
            PublishError::manifest(format!("failed to parse {}: {e}", path.display()))
        })?;

        let root = path
            .parent()
            .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
            .unwrap_or(Path::new("."));
        let root = normalize(&std::path::absolute(root).map_err(|e| PublishError::io(root, e))?);

        let store = validate(raw, path.to_path_buf(), root, require_sources)?;
        info!(entries = store.entries.len(), "loaded notebook manifest");
        Ok(store)
    }

    /// Path of the manifest file itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory that relative manifest paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All entries, in manifest order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Look up an entry by id.
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Entries with at least one destination of `kind`, in manifest order.
    ///
    /// Entries without Nexus support never appear for `nexus_build`.
    pub fn entries_for(&self, kind: DestinationKind) -> Vec<&ManifestEntry> {
        self.entries
            .iter()
            .filter(|e| e.destinations_of(kind).next().is_some())
            .filter(|e| kind != DestinationKind::NexusBuild || e.nexus_support)
            .collect()
    }

    /// Absolute tree root for `kind`.
    pub fn tree_root(&self, kind: DestinationKind) -> PathBuf {
        self.trees
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.root.join(default_tree(kind)))
    }

    /// Map a web-content `SOURCE` reference to a local file.
    ///
    /// URLs under `repo_url` and relative paths both resolve against the
    /// manifest directory. Any other URL is unsupported.
    pub fn resolve_web_source(&self, reference: &str) -> Option<PathBuf> {
        let reference = reference.trim();
        let rel = match &self.repo_url {
            Some(repo) if reference.starts_with(repo.as_str()) => {
                urlencoding::decode(&reference[repo.as_str().len()..]).ok()?.into_owned()
            }
            _ if Url::parse(reference).is_ok() => return None,
            _ => reference.to_string(),
        };
        let path = PathBuf::from(rel);
        is_safe_relative(&path).then(|| normalize(&self.root.join(path)))
    }
}

fn default_tree(kind: DestinationKind) -> &'static str {
    match kind {
        DestinationKind::Website => "build/website",
        DestinationKind::NexusBuild => "build/nexus",
        DestinationKind::CiBuild => "build/ci",
    }
}

// ---------------------------------------------------------------------------
// Raw TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    trees: BTreeMap<String, String>,
    #[serde(default)]
    repo_url: Option<String>,
    #[serde(default)]
    notebooks: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    id: String,
    source_path: String,
    #[serde(default)]
    nexus_support: bool,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    audiences: Vec<String>,
    #[serde(default)]
    upstream_url: Option<String>,
    #[serde(default)]
    destinations: Vec<RawDestination>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDestination {
    kind: String,
    output_path: String,
    #[serde(default)]
    rewrite: Vec<RawRule>,
    #[serde(default)]
    options: RawOptions,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    pattern: String,
    replacement: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    clear_outputs: Option<bool>,
    record_metadata: Option<bool>,
    footer: Option<String>,
    #[serde(default)]
    replace_purple_hr: bool,
    #[serde(default)]
    required_sections: Vec<String>,
    kernelspec: Option<KernelspecOverride>,
    site_url: Option<String>,
    #[serde(default)]
    inject_web_content: bool,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(raw: RawManifest, path: PathBuf, root: PathBuf, require_sources: bool) -> Result<ManifestStore> {
    let mut problems: Vec<String> = Vec::new();

    let mut trees = BTreeMap::new();
    for (name, rel) in &raw.trees {
        match name.parse::<DestinationKind>() {
            Ok(kind) => {
                trees.insert(kind, normalize(&root.join(rel)));
            }
            Err(e) => problems.push(format!("[trees] {e}")),
        }
    }
    let mut resolved = Vec::with_capacity(DestinationKind::ALL.len());
    for kind in DestinationKind::ALL {
        let tree = trees
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| normalize(&root.join(default_tree(kind))));
        if root.starts_with(&tree) {
            problems.push(format!(
                "tree for {kind} ({}) contains the manifest directory",
                tree.display()
            ));
        }
        resolved.push((kind, tree));
    }
    for (i, (a_kind, a)) in resolved.iter().enumerate() {
        for (b_kind, b) in &resolved[i + 1..] {
            if a.starts_with(b) || b.starts_with(a) {
                problems.push(format!(
                    "trees for {a_kind} ({}) and {b_kind} ({}) overlap",
                    a.display(),
                    b.display()
                ));
            }
        }
    }

    let repo_url = match raw.repo_url.as_deref().map(Url::parse) {
        Some(Ok(url)) => Some(url),
        Some(Err(e)) => {
            problems.push(format!("invalid repo_url: {e}"));
            None
        }
        None => None,
    };

    let mut seen_ids = HashSet::new();
    let mut seen_outputs: BTreeSet<(DestinationKind, PathBuf)> = BTreeSet::new();
    let mut entries = Vec::with_capacity(raw.notebooks.len());

    for raw_entry in raw.notebooks {
        let id = raw_entry.id.trim().to_string();
        if id.is_empty() {
            problems.push("entry with empty id".into());
            continue;
        }
        if !seen_ids.insert(id.clone()) {
            problems.push(format!("duplicate id '{id}'"));
            continue;
        }

        let source_path = normalize(&root.join(&raw_entry.source_path));
        if require_sources && !source_path.is_file() {
            problems.push(format!(
                "[{id}] source_path '{}' does not exist",
                raw_entry.source_path
            ));
        }
        for (kind, tree) in &resolved {
            if source_path.starts_with(tree) {
                problems.push(format!("[{id}] source_path lies inside the {kind} tree"));
            }
        }

        let upstream_url = match raw_entry.upstream_url.as_deref().map(Url::parse) {
            Some(Ok(url)) => Some(url),
            Some(Err(e)) => {
                problems.push(format!("[{id}] invalid upstream_url: {e}"));
                None
            }
            None => None,
        };

        let mut destinations = Vec::with_capacity(raw_entry.destinations.len());
        for raw_dest in raw_entry.destinations {
            match validate_destination(&id, raw_dest, &root, &resolved) {
                Ok(dest) => {
                    if !seen_outputs.insert((dest.kind, dest.output_path.clone())) {
                        problems.push(format!(
                            "[{id}] output_path '{}' collides with another {} destination",
                            dest.output_path.display(),
                            dest.kind
                        ));
                    }
                    destinations.push(dest);
                }
                Err(mut errs) => problems.append(&mut errs),
            }
        }

        if !raw_entry.nexus_support
            && destinations.iter().any(|d| d.kind == DestinationKind::NexusBuild)
        {
            warn!(%id, "entry has a nexus_build destination but nexus_support = false; it will be skipped");
        }

        debug!(%id, destinations = destinations.len(), "validated manifest entry");
        entries.push(ManifestEntry {
            id,
            source_path,
            destinations,
            nexus_support: raw_entry.nexus_support,
            session: raw_entry.session,
            audiences: raw_entry.audiences,
            upstream_url,
        });
    }

    if !problems.is_empty() {
        return Err(PublishError::manifest(format!(
            "{} problem(s) in {}:\n  - {}",
            problems.len(),
            path.display(),
            problems.join("\n  - ")
        )));
    }

    Ok(ManifestStore {
        path,
        root,
        trees,
        repo_url,
        entries,
    })
}

fn validate_destination(
    id: &str,
    raw: RawDestination,
    root: &Path,
    trees: &[(DestinationKind, PathBuf)],
) -> std::result::Result<DestinationSpec, Vec<String>> {
    let mut problems = Vec::new();

    let kind = raw
        .kind
        .parse::<DestinationKind>()
        .map_err(|e| problems.push(format!("[{id}] {e}")))
        .ok();

    let output_path = normalize(Path::new(&raw.output_path));
    if !is_safe_relative(Path::new(&raw.output_path)) || output_path.as_os_str().is_empty() {
        problems.push(format!(
            "[{id}] output_path '{}' must be relative and must not contain '..'",
            raw.output_path
        ));
    }

    let mut rules = Vec::with_capacity(raw.rewrite.len());
    for rule in &raw.rewrite {
        match RewriteRule::new(&rule.pattern, rule.replacement.clone()) {
            Ok(r) => rules.push(r),
            Err(e) => problems.push(format!("[{id}] {e}")),
        }
    }

    let footer = match raw.options.footer.as_deref() {
        Some(rel) => {
            let footer_path = normalize(&root.join(rel));
            if let Some((kind, _)) = trees.iter().find(|(_, tree)| footer_path.starts_with(tree)) {
                problems.push(format!("[{id}] footer '{rel}' lies inside the {kind} tree"));
            }
            match std::fs::read_to_string(&footer_path) {
                Ok(text) if has_footer(&text) => Some(text),
                Ok(_) => {
                    problems.push(format!(
                        "[{id}] footer '{rel}' lacks the <!-- Footer Start -->/<!-- Footer End --> markers"
                    ));
                    None
                }
                Err(e) => {
                    problems.push(format!("[{id}] cannot read footer '{rel}': {e}"));
                    None
                }
            }
        }
        None => None,
    };

    let site_url = match raw.options.site_url.as_deref().map(Url::parse) {
        Some(Ok(url)) => Some(url),
        Some(Err(e)) => {
            problems.push(format!("[{id}] invalid site_url: {e}"));
            None
        }
        None => None,
    };

    let Some(kind) = kind else {
        return Err(problems);
    };
    if !problems.is_empty() {
        return Err(problems);
    }

    let defaults = DestinationOptions::default();
    Ok(DestinationSpec {
        kind,
        output_path,
        rules,
        options: DestinationOptions {
            clear_outputs: raw.options.clear_outputs.unwrap_or(defaults.clear_outputs),
            record_metadata: raw.options.record_metadata.unwrap_or(defaults.record_metadata),
            footer,
            replace_purple_hr: raw.options.replace_purple_hr,
            required_sections: raw.options.required_sections,
            kernelspec: raw.options.kernelspec,
            site_url,
            inject_web_content: raw.options.inject_web_content,
        },
    })
}

/// Relative, non-empty, and free of `..` or root components.
fn is_safe_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Resolve `.` and `..` lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nbp-manifest-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(dir.join("notebooks")).unwrap();
        std::fs::write(dir.join("notebooks/intro.ipynb"), "{}").unwrap();
        std::fs::write(dir.join("notebooks/fit.ipynb"), "{}").unwrap();
        std::fs::write(dir.join("notebooks/helpers.py"), "").unwrap();
        dir
    }

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("notebooks_manifest.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    const VALID: &str = r#"
[trees]
website = "site/notebooks"
nexus_build = "RRN/build"
ci_build = "RRN/ci_build"

[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
nexus_support = true
session = "1"
audiences = ["students"]

[[notebooks.destinations]]
kind = "nexus_build"
output_path = "intro/intro.ipynb"
rewrite = [{ pattern = '^\.\./data/', replacement = "../../data/" }]

[[notebooks.destinations]]
kind = "website"
output_path = "intro.md"
[notebooks.destinations.options]
site_url = "https://rges-pit.org/"

[[notebooks]]
id = "fit"
source_path = "notebooks/fit.ipynb"

[[notebooks.destinations]]
kind = "nexus_build"
output_path = "fit/fit.ipynb"

[[notebooks.destinations]]
kind = "ci_build"
output_path = "fit.ipynb"
[notebooks.destinations.options]
clear_outputs = false

[[notebooks]]
id = "helpers"
source_path = "notebooks/helpers.py"
nexus_support = true

[[notebooks.destinations]]
kind = "ci"
output_path = "helpers.py"
"#;

    #[test]
    fn loads_valid_manifest() {
        let dir = temp_dir();
        let store = ManifestStore::load(&write_manifest(&dir, VALID)).expect("load");

        assert_eq!(store.entries().len(), 3);
        let intro = store.entry("intro").unwrap();
        assert_eq!(intro.session.as_deref(), Some("1"));
        assert_eq!(intro.destinations.len(), 2);
        assert_eq!(intro.destinations[0].rules.len(), 1);
        assert!(intro.destinations[0].options.clear_outputs);
        assert!(intro.destinations[1].options.site_url.is_some());
        assert!(!store.entry("fit").unwrap().destinations[1].options.clear_outputs);
        assert!(store.tree_root(DestinationKind::NexusBuild).ends_with("RRN/build"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn entries_for_respects_nexus_support_and_order() {
        let dir = temp_dir();
        let store = ManifestStore::load(&write_manifest(&dir, VALID)).unwrap();

        let ids = |kind| {
            store
                .entries_for(kind)
                .iter()
                .map(|e| e.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(DestinationKind::NexusBuild), vec!["intro"]);
        assert_eq!(ids(DestinationKind::CiBuild), vec!["fit", "helpers"]);
        assert_eq!(ids(DestinationKind::Website), vec!["intro"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    fn load_err(body: &str) -> String {
        let dir = temp_dir();
        let err = ManifestStore::load(&write_manifest(&dir, body)).unwrap_err();
        let _ = std::fs::remove_dir_all(&dir);
        assert!(matches!(err, PublishError::Manifest { .. }), "{err}");
        err.to_string()
    }

    #[test]
    fn missing_source_rejected() {
        let msg = load_err(
            r#"
[[notebooks]]
id = "ghost"
source_path = "notebooks/ghost.ipynb"
"#,
        );
        assert!(msg.contains("ghost.ipynb"));
    }

    #[test]
    fn lenient_load_accepts_missing_source() {
        let dir = temp_dir();
        let path = write_manifest(
            &dir,
            r#"
[[notebooks]]
id = "ghost"
source_path = "notebooks/ghost.ipynb"
upstream_url = "https://example.org/ghost.ipynb"
"#,
        );
        let store = ManifestStore::load_lenient(&path).unwrap();
        assert!(store.entry("ghost").unwrap().upstream_url.is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn duplicate_id_rejected() {
        let msg = load_err(
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"

[[notebooks]]
id = "intro"
source_path = "notebooks/fit.ipynb"
"#,
        );
        assert!(msg.contains("duplicate id 'intro'"));
    }

    #[test]
    fn unknown_kind_rejected() {
        let msg = load_err(
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
[[notebooks.destinations]]
kind = "pdf"
output_path = "intro.pdf"
"#,
        );
        assert!(msg.contains("'pdf'"));
    }

    #[test]
    fn unsafe_and_colliding_outputs_rejected() {
        let msg = load_err(
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "../escape.ipynb"

[[notebooks]]
id = "fit"
source_path = "notebooks/fit.ipynb"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "same.ipynb"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "same.ipynb"
"#,
        );
        assert!(msg.contains("must be relative"));
        assert!(msg.contains("collides"));
    }

    #[test]
    fn invalid_rewrite_pattern_rejected() {
        let msg = load_err(
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "intro.ipynb"
rewrite = [{ pattern = "(", replacement = "x" }]
"#,
        );
        assert!(msg.contains("invalid rewrite pattern"));
    }

    #[test]
    fn tree_containing_manifest_rejected() {
        let msg = load_err(
            r#"
[trees]
ci_build = "."
"#,
        );
        assert!(msg.contains("contains the manifest directory"));
    }

    #[test]
    fn nested_or_shared_trees_rejected() {
        let msg = load_err(
            r#"
[trees]
website = "out"
ci_build = "out/ci"
"#,
        );
        assert!(msg.contains("overlap"), "{msg}");
        assert!(msg.contains("website") && msg.contains("ci_build"), "{msg}");

        let msg = load_err(
            r#"
[trees]
nexus_build = "out"
ci_build = "./out"
"#,
        );
        assert!(msg.contains("overlap"), "{msg}");
    }

    #[test]
    fn footer_inside_tree_rejected() {
        let dir = temp_dir();
        std::fs::create_dir_all(dir.join("build/nexus")).unwrap();
        std::fs::write(
            dir.join("build/nexus/footer.md"),
            "<!-- Footer Start -->\nThanks\n<!-- Footer End -->\n",
        )
        .unwrap();
        let path = write_manifest(
            &dir,
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
nexus_support = true
[[notebooks.destinations]]
kind = "nexus_build"
output_path = "intro.ipynb"
[notebooks.destinations.options]
footer = "build/nexus/footer.md"
"#,
        );
        let err = ManifestStore::load(&path).unwrap_err().to_string();
        assert!(err.contains("lies inside the nexus_build tree"), "{err}");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn equivalent_output_paths_collide() {
        let msg = load_err(
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
[[notebooks.destinations]]
kind = "website"
output_path = "x.md"

[[notebooks]]
id = "fit"
source_path = "notebooks/fit.ipynb"
[[notebooks.destinations]]
kind = "website"
output_path = "./x.md"
"#,
        );
        assert!(msg.contains("collides"), "{msg}");
    }

    #[test]
    fn output_paths_are_normalized() {
        let dir = temp_dir();
        let path = write_manifest(
            &dir,
            r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
[[notebooks.destinations]]
kind = "ci_build"
output_path = "./a/./intro.ipynb"
"#,
        );
        let store = ManifestStore::load(&path).unwrap();
        assert_eq!(store.entries()[0].destinations[0].output_path, PathBuf::from("a/intro.ipynb"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn web_sources_resolve_against_manifest_dir() {
        let dir = temp_dir();
        let path = write_manifest(
            &dir,
            r#"
repo_url = "https://github.com/rges-pit/data-challenge-notebooks/blob/main/"

[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
[[notebooks.destinations]]
kind = "nexus_build"
output_path = "intro.md"
[notebooks.destinations.options]
inject_web_content = true
"#,
        );
        let store = ManifestStore::load(&path).unwrap();
        assert!(store.entries()[0].destinations[0].options.inject_web_content);

        let root = store.root().to_path_buf();
        assert_eq!(
            store.resolve_web_source(
                "https://github.com/rges-pit/data-challenge-notebooks/blob/main/notebooks/My%20Page.md"
            ),
            Some(root.join("notebooks/My Page.md"))
        );
        assert_eq!(store.resolve_web_source("notebooks/intro.md"), Some(root.join("notebooks/intro.md")));
        assert_eq!(store.resolve_web_source("https://example.org/page.md"), None);
        assert_eq!(store.resolve_web_source("../outside.md"), None);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn footer_loaded_and_validated() {
        let dir = temp_dir();
        std::fs::write(
            dir.join("footer.md"),
            "<!-- Footer Start -->\nThanks\n<!-- Footer End -->\n",
        )
        .unwrap();
        std::fs::write(dir.join("bad_footer.md"), "no markers\n").unwrap();

        let good = r#"
[[notebooks]]
id = "intro"
source_path = "notebooks/intro.ipynb"
nexus_support = true
[[notebooks.destinations]]
kind = "nexus_build"
output_path = "intro.ipynb"
[notebooks.destinations.options]
footer = "footer.md"
"#;
        let store = ManifestStore::load(&write_manifest(&dir, good)).unwrap();
        let footer = store.entries()[0].destinations[0].options.footer.as_deref().unwrap();
        assert!(footer.contains("Thanks"));

        let bad = good.replace("footer.md", "bad_footer.md");
        let err = ManifestStore::load(&write_manifest(&dir, &bad)).unwrap_err();
        assert!(err.to_string().contains("lacks"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unparsable_manifest_is_manifest_error() {
        let msg = load_err("[[notebooks]\nid = ");
        assert!(msg.contains("failed to parse"));
    }

    #[test]
    fn output_path_safety() {
        assert!(is_safe_relative(Path::new("a/b.ipynb")));
        assert!(is_safe_relative(Path::new("./a.md")));
        assert!(!is_safe_relative(Path::new("/abs.ipynb")));
        assert!(!is_safe_relative(Path::new("a/../../b")));
        assert!(!is_safe_relative(Path::new("")));
    }

    #[test]
    fn sample_fixture_manifest_loads() {
        let store = ManifestStore::load(Path::new("../../../fixtures/manifests/notebooks_manifest.toml"))
            .expect("fixture manifest");
        let sample = store.entry("sample").unwrap();
        assert!(sample.source_path.ends_with("fixtures/notebooks/sample.ipynb"));
        assert_eq!(sample.destinations.len(), 3);
        for kind in DestinationKind::ALL {
            assert_eq!(store.entries_for(kind).len(), 1);
            assert!(store.tree_root(kind).starts_with(store.root().parent().unwrap().parent().unwrap()));
        }
    }
}
