//! Shared types, error model, and configuration for nbpublish.
//!
//! This crate is the foundation depended on by all other nbpublish crates.
//! It provides:
//! - [`PublishError`]: the unified error type
//! - Domain types ([`DestinationKind`], [`BuildProfile`], [`Warning`], reserved tags)
//! - Tool configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CiConfig, DefaultsConfig, FetchConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{PublishError, Result};
pub use types::{
    BuildProfile, DestinationKind, TAG_CI_SKIP, TAG_COLAB_ONLY, TAG_NEXUS_ONLY, TAG_SLOW,
    TAG_WEB_INCLUDE, Warning,
};
