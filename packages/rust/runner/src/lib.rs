//! CI executor for nbpublish artifact trees.
//!
//! [`execute`] runs every notebook of a tree under a build profile through a
//! [`Kernel`], with a wall-clock timeout per notebook and optional
//! notebook-level parallelism.

mod executor;
mod kernel;

pub use executor::{CiReport, ExecuteOptions, NotebookRun, RunStatus, execute};
pub use kernel::{CommandKernel, Kernel, NOTEBOOK_PLACEHOLDER};
