//! Tool configuration for nbpublish.
//!
//! User config lives at `~/.nbpublish/nbpublish.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! This is configuration of the *tool* (kernel command, timeouts, default
//! profiles). What gets published is driven solely by the notebook manifest.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PublishError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "nbpublish.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".nbpublish";

// ---------------------------------------------------------------------------
// Config structs (matching nbpublish.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// CI executor settings.
    #[serde(default)]
    pub ci: CiConfig,

    /// Upstream fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Manifest path used when `--manifest` is not given.
    #[serde(default = "default_manifest")]
    pub manifest: String,

    /// Profile used by `build` when `--profile` is not given.
    #[serde(default = "default_build_profile")]
    pub build_profile: String,

    /// Profile used by `ci-run` when `--profile` is not given.
    #[serde(default = "default_ci_profile")]
    pub ci_profile: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            build_profile: default_build_profile(),
            ci_profile: default_ci_profile(),
        }
    }
}

fn default_manifest() -> String {
    "notebooks_manifest.toml".into()
}
fn default_build_profile() -> String {
    "publish".into()
}
fn default_ci_profile() -> String {
    "fast".into()
}

/// `[ci]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiConfig {
    /// Wall-clock budget per notebook, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of notebooks executed concurrently.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Kernel command; `{notebook}` is replaced with the notebook path.
    #[serde(default = "default_kernel_command")]
    pub kernel_command: Vec<String>,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            jobs: default_jobs(),
            kernel_command: default_kernel_command(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    1800
}
fn default_jobs() -> usize {
    1
}
fn default_kernel_command() -> Vec<String> {
    [
        "jupyter",
        "nbconvert",
        "--to",
        "notebook",
        "--execute",
        "--stdout",
        "{notebook}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// HTTP timeout for upstream source downloads, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for upstream requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("nbpublish/", env!("CARGO_PKG_VERSION")).into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.nbpublish/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PublishError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.nbpublish/nbpublish.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PublishError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PublishError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PublishError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PublishError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PublishError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ci.kernel_command.is_empty() {
            return Err(PublishError::config("ci.kernel_command must not be empty"));
        }
        if self.ci.jobs == 0 {
            return Err(PublishError::config("ci.jobs must be at least 1"));
        }
        if self.ci.timeout_secs == 0 {
            return Err(PublishError::config("ci.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}
