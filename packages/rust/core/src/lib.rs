//! Core publishing pipeline for nbpublish.
//!
//! This crate ties the manifest, cell filter, path rewriter and finishers
//! together into the end-to-end workflows: `build`, `sync` and `pull`.

pub mod build;
pub mod files;
pub mod finish;
pub mod manifest;
pub mod sync;
pub mod transform;
pub mod upstream;

pub use build::{BuildReport, EntryOutcome, OutcomeStatus, ProgressReporter, SilentProgress, build};
pub use manifest::{DestinationOptions, DestinationSpec, KernelspecOverride, ManifestEntry, ManifestStore};
pub use sync::{SyncOptions, SyncReport, sync};
pub use transform::{Artifact, transform};
pub use upstream::{PullOutcome, PullReport, PullStatus, pull};
