//! Error types for nbpublish.
//!
//! Library crates use [`PublishError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The variants follow the pipeline's failure taxonomy: manifest and sync-root
//! errors are fatal for their step, transform and execution errors are
//! isolated per entry/notebook and collected into reports by the callers.

use std::path::PathBuf;

/// Top-level error type for all nbpublish operations.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Tool configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed manifest or a manifest entry that cannot be trusted.
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// A single entry failed somewhere in its transform pipeline.
    #[error("transform error [{id}]: {message}")]
    Transform { id: String, message: String },

    /// The external sync root is unusable.
    #[error("sync error: {message}")]
    Sync { message: String },

    /// A notebook could not be executed.
    #[error("execution error [{id}]: {message}")]
    Execution { id: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Notebook or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Network/HTTP error while fetching upstream sources.
    #[error("network error: {0}")]
    Network(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PublishError>;

impl PublishError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a manifest error from any displayable message.
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest {
            message: msg.into(),
        }
    }

    /// Create a transform error for the given entry id.
    pub fn transform(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transform {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Create a sync error from any displayable message.
    pub fn sync(msg: impl Into<String>) -> Self {
        Self::Sync {
            message: msg.into(),
        }
    }

    /// Create an execution error for the given notebook id.
    pub fn execution(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Execution {
            id: id.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
