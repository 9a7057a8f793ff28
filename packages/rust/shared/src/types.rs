//! Core domain types shared across the publishing pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PublishError, Result};

/// Cell tag marking long-running cells skipped by the `fast` profile.
pub const TAG_SLOW: &str = "slow";

/// Cell tag marking cells that never run in CI.
pub const TAG_CI_SKIP: &str = "ci-skip";

/// Cell tag marking cells that only make sense on the Nexus platform.
pub const TAG_NEXUS_ONLY: &str = "nexus-only";

/// Cell tag marking cells that only run on Google Colab; dropped from every build.
pub const TAG_COLAB_ONLY: &str = "colab-only";

/// Cell tag opting a code cell into website fragments.
pub const TAG_WEB_INCLUDE: &str = "web-include";

// ---------------------------------------------------------------------------
// DestinationKind
// ---------------------------------------------------------------------------

/// The closed set of publishing targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Markdown page fragments for the website source tree.
    Website,
    /// Notebooks ready for the Nexus platform.
    NexusBuild,
    /// Portable notebooks runnable on a generic kernel in CI.
    CiBuild,
}

impl DestinationKind {
    /// All kinds, in a stable order.
    pub const ALL: [DestinationKind; 3] = [Self::Website, Self::NexusBuild, Self::CiBuild];

    /// The manifest spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::NexusBuild => "nexus_build",
            Self::CiBuild => "ci_build",
        }
    }
}

impl std::fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DestinationKind {
    type Err = PublishError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            "nexus_build" | "nexus-build" | "nexus" => Ok(Self::NexusBuild),
            "ci_build" | "ci-build" | "ci" => Ok(Self::CiBuild),
            other => Err(PublishError::manifest(format!(
                "unrecognized destination kind '{other}' (expected website, nexus_build or ci_build)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildProfile
// ---------------------------------------------------------------------------

/// A named set of excluded cell tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProfile {
    /// Profile name as shown in reports.
    pub name: String,
    /// Cells carrying any of these tags are dropped.
    pub excluded_tags: BTreeSet<String>,
}

impl BuildProfile {
    /// Create a profile from a name and tag list.
    pub fn new<I, S>(name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            excluded_tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// `fast = {slow, ci-skip}`.
    pub fn fast() -> Self {
        Self::new("fast", [TAG_SLOW, TAG_CI_SKIP])
    }

    /// `full = {ci-skip}`.
    pub fn full() -> Self {
        Self::new("full", [TAG_CI_SKIP])
    }

    /// `publish = {}`: keeps every authored cell.
    pub fn publish() -> Self {
        Self::new("publish", std::iter::empty::<&str>())
    }

    /// Resolve one of the canonical profiles by name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "fast" => Ok(Self::fast()),
            "full" => Ok(Self::full()),
            "publish" => Ok(Self::publish()),
            other => Err(PublishError::config(format!(
                "unknown profile '{other}' (expected fast, full or publish)"
            ))),
        }
    }

    /// Whether the profile excludes this tag.
    pub fn excludes(&self, tag: &str) -> bool {
        self.excluded_tags.contains(tag)
    }
}

// ---------------------------------------------------------------------------
// Warning
// ---------------------------------------------------------------------------

/// A non-fatal observation surfaced in reports (dropped cell, unrewritten path, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Index of the cell in the document being processed, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<usize>,
    /// Human-readable description.
    pub message: String,
}

impl Warning {
    /// A warning tied to a specific cell.
    pub fn cell(index: usize, message: impl Into<String>) -> Self {
        Self {
            cell: Some(index),
            message: message.into(),
        }
    }

    /// A document-level warning.
    pub fn doc(message: impl Into<String>) -> Self {
        Self {
            cell: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell {
            Some(i) => write!(f, "cell {i}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_kind_roundtrip() {
        for kind in DestinationKind::ALL {
            let parsed: DestinationKind = kind.to_string().parse().expect("parse kind");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn destination_kind_aliases() {
        assert_eq!("nexus".parse::<DestinationKind>().unwrap(), DestinationKind::NexusBuild);
        assert_eq!("ci-build".parse::<DestinationKind>().unwrap(), DestinationKind::CiBuild);
    }

    #[test]
    fn unknown_kind_is_manifest_error() {
        let err = "pdf".parse::<DestinationKind>().unwrap_err();
        assert!(matches!(err, PublishError::Manifest { .. }));
        assert!(err.to_string().contains("'pdf'"));
    }

    #[test]
    fn destination_kind_serde_snake_case() {
        let json = serde_json::to_string(&DestinationKind::NexusBuild).unwrap();
        assert_eq!(json, "\"nexus_build\"");
    }

    #[test]
    fn canonical_profiles() {
        let fast = BuildProfile::fast();
        assert!(fast.excludes(TAG_SLOW));
        assert!(fast.excludes(TAG_CI_SKIP));

        let full = BuildProfile::full();
        assert!(!full.excludes(TAG_SLOW));
        assert!(full.excludes(TAG_CI_SKIP));

        assert!(BuildProfile::publish().excluded_tags.is_empty());
    }

    #[test]
    fn profile_from_name() {
        assert_eq!(BuildProfile::from_name("full").unwrap(), BuildProfile::full());
        assert!(BuildProfile::from_name("slowest").is_err());
    }

    #[test]
    fn warning_display() {
        assert_eq!(Warning::cell(3, "dropped").to_string(), "cell 3: dropped");
        assert_eq!(Warning::doc("no regions").to_string(), "no regions");
    }
}
