//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use nbpublish_core::{
    BuildReport, EntryOutcome, ManifestStore, OutcomeStatus, ProgressReporter, PullStatus,
    SyncOptions,
};
use nbpublish_runner::{CommandKernel, ExecuteOptions, RunStatus};
use nbpublish_shared::{
    AppConfig, BuildProfile, DestinationKind, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// nbpublish: derive, sync and test published notebooks from one manifest.
#[derive(Parser)]
#[command(
    name = "nbpublish",
    version,
    about = "Manifest-driven publishing of instructional notebooks to the website, Nexus and CI.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Notebook manifest (defaults to `defaults.manifest` from the config file).
    #[arg(long, env = "NBPUBLISH_MANIFEST", global = true)]
    pub manifest: Option<PathBuf>,

    /// Tool config file (defaults to ~/.nbpublish/nbpublish.toml).
    #[arg(long, env = "NBPUBLISH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Delete and regenerate the artifact tree for one destination kind.
    Build {
        /// Destination kind: website, nexus_build or ci_build.
        kind: DestinationKind,

        /// Profile: publish, fast or full (defaults to `defaults.build_profile`).
        #[arg(long)]
        profile: Option<String>,

        /// Write the build report as JSON to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Copy a built tree into an external working directory.
    Sync {
        /// Destination kind whose tree is synced.
        kind: DestinationKind,

        /// Root of the external working directory.
        external_root: PathBuf,

        /// Delete files under the external root that the tree no longer has (dot-entries are kept).
        #[arg(long)]
        prune: bool,

        /// Report what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Execute a built tree's notebooks under a CI profile.
    #[command(name = "ci-run")]
    CiRun {
        /// Destination kind whose tree is executed.
        kind: DestinationKind,

        /// Profile: fast or full (defaults to `defaults.ci_profile`).
        #[arg(long)]
        profile: Option<String>,

        /// Per-notebook timeout in seconds (defaults to `ci.timeout_secs`).
        #[arg(long)]
        timeout: Option<u64>,

        /// Notebooks executed concurrently (defaults to `ci.jobs`).
        #[arg(long)]
        jobs: Option<usize>,
    },

    /// Refresh canonical sources from their `upstream_url`.
    Pull {
        /// Only these entry ids (can be specified multiple times).
        #[arg(long)]
        only: Vec<String>,
    },

    /// Manifest inspection.
    Manifest {
        #[command(subcommand)]
        action: ManifestAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Manifest subcommands.
#[derive(Subcommand)]
pub(crate) enum ManifestAction {
    /// Validate the manifest and list entries per destination kind.
    Check,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "nbpublish=info",
        1 => "nbpublish=debug",
        _ => "nbpublish=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolved tool config plus the manifest path it implies.
struct Context {
    config: AppConfig,
    manifest: PathBuf,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        let manifest = cli
            .manifest
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.defaults.manifest));
        Ok(Self { config, manifest })
    }

    fn store(&self) -> Result<ManifestStore> {
        Ok(ManifestStore::load(&self.manifest)?)
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config.as_deref()),
        };
    }

    let ctx = Context::load(&cli)?;
    match cli.command {
        Command::Build {
            kind,
            profile,
            report,
        } => cmd_build(&ctx, kind, profile.as_deref(), report.as_deref()),
        Command::Sync {
            kind,
            external_root,
            prune,
            dry_run,
        } => cmd_sync(&ctx, kind, &external_root, SyncOptions { prune, dry_run }),
        Command::CiRun {
            kind,
            profile,
            timeout,
            jobs,
        } => cmd_ci_run(&ctx, kind, profile.as_deref(), timeout, jobs).await,
        Command::Pull { only } => cmd_pull(&ctx, &only).await,
        Command::Manifest {
            action: ManifestAction::Check,
        } => cmd_manifest_check(&ctx),
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_build(
    ctx: &Context,
    kind: DestinationKind,
    profile: Option<&str>,
    report_path: Option<&Path>,
) -> Result<()> {
    let store = ctx.store()?;
    let profile = BuildProfile::from_name(profile.unwrap_or(&ctx.config.defaults.build_profile))?;

    info!(%kind, profile = %profile.name, manifest = %ctx.manifest.display(), "building tree");

    let reporter = CliProgress::new();
    let report = nbpublish_core::build(&store, kind, &profile, &reporter)?;

    if let Some(path) = report_path {
        report.write_json(path)?;
    }

    print_build_summary(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(eyre!("build failed for: {}", report.failed_ids().join(", ")))
    }
}

fn print_build_summary(report: &BuildReport) {
    let built = report.outcomes.iter().filter(|o| o.is_built()).count();
    println!();
    println!("  Build {}", if report.is_success() { "complete" } else { "finished with failures" });
    println!("  Run:      {}", report.run_id);
    println!("  Kind:     {}", report.kind);
    println!("  Profile:  {}", report.profile);
    println!("  Tree:     {}", report.tree.display());
    println!("  Built:    {built}/{}", report.outcomes.len());
    println!("  Warnings: {}", report.warning_count());
    println!("  Time:     {:.1}s", report.elapsed_ms as f64 / 1000.0);
    for outcome in &report.outcomes {
        if let OutcomeStatus::Failed { error } = &outcome.status {
            println!("  FAILED   {} ({}): {error}", outcome.id, outcome.output.display());
        }
    }
    println!();
}

fn cmd_sync(ctx: &Context, kind: DestinationKind, external_root: &Path, options: SyncOptions) -> Result<()> {
    let store = ctx.store()?;
    let tree = store.tree_root(kind);

    info!(%kind, tree = %tree.display(), external_root = %external_root.display(), "syncing tree");
    let report = nbpublish_core::sync(&tree, external_root, &options)?;

    let list = |label: &str, files: &[PathBuf]| {
        for f in files {
            println!("  {label:<9}{}", f.display());
        }
    };

    println!();
    if report.dry_run {
        println!("  Dry run: nothing was written");
    }
    list("added", &report.added);
    list("changed", &report.changed);
    list("removed", &report.removed);
    list("orphaned", &report.orphaned);
    for w in &report.warnings {
        println!("  warning  {w}");
    }
    println!(
        "  {} added, {} changed, {} removed, {} orphaned, {} unchanged",
        report.added.len(),
        report.changed.len(),
        report.removed.len(),
        report.orphaned.len(),
        report.unchanged
    );
    println!();

    Ok(())
}

async fn cmd_ci_run(
    ctx: &Context,
    kind: DestinationKind,
    profile: Option<&str>,
    timeout: Option<u64>,
    jobs: Option<usize>,
) -> Result<()> {
    let store = ctx.store()?;
    let tree = store.tree_root(kind);
    let profile = BuildProfile::from_name(profile.unwrap_or(&ctx.config.defaults.ci_profile))?;
    let options = ExecuteOptions {
        profile,
        timeout: Duration::from_secs(timeout.unwrap_or(ctx.config.ci.timeout_secs)),
        jobs: jobs.unwrap_or(ctx.config.ci.jobs),
    };
    if options.jobs == 0 {
        return Err(eyre!("--jobs must be at least 1"));
    }
    let kernel = Arc::new(CommandKernel::new(ctx.config.ci.kernel_command.clone())?);

    info!(%kind, profile = %options.profile.name, tree = %tree.display(), "running CI profile");

    let spinner = spinner();
    spinner.set_message(format!("Executing notebooks in {}", tree.display()));
    let report = nbpublish_runner::execute(&tree, &options, kernel).await;
    spinner.finish_and_clear();
    let report = report?;

    println!();
    for run in &report.runs {
        let status = match &run.status {
            RunStatus::Passed => "passed".to_string(),
            RunStatus::Failed { message } => format!("FAILED: {}", first_line(message)),
            RunStatus::TimedOut => format!("TIMED OUT after {}s", options.timeout.as_secs()),
            RunStatus::Skipped { reason } => format!("skipped ({reason})"),
        };
        println!("  {:<40} {:>7.1}s  {status}", run.id, run.duration.as_secs_f64());
    }
    let (passed, failed, timed_out, skipped) = report.counts();
    println!();
    println!("  {passed} passed, {failed} failed, {timed_out} timed out, {skipped} skipped");
    println!();

    if report.is_success() {
        Ok(())
    } else {
        Err(eyre!("CI run failed for: {}", report.failed_ids().join(", ")))
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

async fn cmd_pull(ctx: &Context, only: &[String]) -> Result<()> {
    let store = ManifestStore::load_lenient(&ctx.manifest)?;

    info!(manifest = %ctx.manifest.display(), only = only.len(), "pulling upstream sources");
    let report = nbpublish_core::pull(&store, only, &ctx.config.fetch).await?;

    println!();
    for outcome in &report.outcomes {
        match &outcome.status {
            PullStatus::Updated { bytes } => println!("  updated    {} ({bytes} bytes)", outcome.id),
            PullStatus::Unchanged => println!("  unchanged  {}", outcome.id),
            PullStatus::Failed { error } => println!("  FAILED     {}: {error}", outcome.id),
        }
    }
    if report.outcomes.is_empty() {
        println!("  No entries declare an upstream_url");
    }
    println!();

    if report.is_success() {
        Ok(())
    } else {
        Err(eyre!("pull failed for: {}", report.failed_ids().join(", ")))
    }
}

fn cmd_manifest_check(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;

    println!();
    println!("  Manifest: {}", store.path().display());
    println!("  Entries:  {}", store.entries().len());
    for kind in DestinationKind::ALL {
        let entries = store.entries_for(kind);
        println!();
        println!("  {kind} -> {} ({} entries)", store.tree_root(kind).display(), entries.len());
        for entry in entries {
            for dest in entry.destinations_of(kind) {
                println!("    {:<24} {}", entry.id, dest.output_path.display());
                for rule in &dest.rules {
                    println!("    {:<24}   rewrite {} -> {}", "", rule.pattern(), rule.replacement());
                }
            }
        }
    }
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self { spinner: spinner() }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn entry_started(&self, id: &str, current: usize, total: usize) {
        self.spinner.set_message(format!("Building [{current}/{total}] {id}"));
    }

    fn entry_finished(&self, outcome: &EntryOutcome) {
        if let OutcomeStatus::Built { warnings, .. } = &outcome.status {
            for w in warnings {
                self.spinner
                    .println(format!("  warning  {} ({}): {w}", outcome.id, outcome.output.display()));
            }
        }
    }

    fn done(&self, _report: &BuildReport) {
        self.spinner.finish_and_clear();
    }
}
