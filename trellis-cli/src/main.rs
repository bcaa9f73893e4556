//! Trellis: keep a workspace in step with the builds it imports.
//!
//! # Usage
//!
//! ```text
//! trellis init [--distribution <dist>] [--offline] [--auto-sync]
//! trellis import <root> [--overwrite] [--working-set <name>]... [--distribution <dist>]
//! trellis refresh [--no-import]
//! trellis refresh-project <name>
//! trellis remove <name> [--refresh]
//! trellis settings [--distribution <dist>] [--offline <bool>] [--auto-sync <bool>] ...
//! trellis status [--json]
//! ```

mod commands;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    import::ImportArgs, init::InitArgs, refresh::RefreshArgs, refresh::RefreshProjectArgs, remove::RemoveArgs,
    settings::SettingsArgs, status::StatusArgs,
};
use trellis_core::Distribution;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version,
    about = "Synchronize a workspace with the module structure of its builds",
    long_about = None,
)]
struct Cli {
    /// Workspace directory (defaults to the current directory).
    #[arg(long, global = true, env = "TRELLIS_WORKSPACE", value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the workspace state with its initial defaults.
    Init(InitArgs),

    /// Import a build and bring its modules into the workspace.
    Import(ImportArgs),

    /// Refresh every build the workspace already knows.
    Refresh(RefreshArgs),

    /// Re-apply the build model to one project.
    RefreshProject(RefreshProjectArgs),

    /// Remove a project from the workspace. Its files stay on disk.
    Remove(RemoveArgs),

    /// Show or change the workspace defaults for imported builds.
    Settings(SettingsArgs),

    /// List workspace projects and the builds they belong to.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Shared Distribution argument: parsed from CLI strings, converts to core type
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `Distribution` from
/// `wrapper`, `version:<v>`, `local:<dir>` or `remote:<uri>`.
#[derive(Debug, Clone)]
pub struct DistributionArg(pub Distribution);

impl FromStr for DistributionArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("wrapper") {
            return Ok(Self(Distribution::Wrapper));
        }
        let invalid = || {
            format!(
                "unknown distribution '{s}'; expected: wrapper, version:<v>, local:<dir>, remote:<uri>"
            )
        };
        let (kind, value) = s.split_once(':').ok_or_else(invalid)?;
        if value.is_empty() {
            return Err(invalid());
        }
        match kind.to_ascii_lowercase().as_str() {
            "version" => Ok(Self(Distribution::Version(value.to_string()))),
            "local" => Ok(Self(Distribution::Local(PathBuf::from(value)))),
            "remote" => Ok(Self(Distribution::Remote(value.to_string()))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DistributionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<DistributionArg> for Distribution {
    fn from(d: DistributionArg) -> Self {
        d.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    trellis_jobs::init_tracing(level, cli.log_json);

    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    match cli.command {
        Commands::Init(args) => args.run(&workspace),
        Commands::Import(args) => args.run(&workspace).await,
        Commands::Refresh(args) => args.run(&workspace).await,
        Commands::RefreshProject(args) => args.run(&workspace).await,
        Commands::Remove(args) => args.run(&workspace).await,
        Commands::Settings(args) => args.run(&workspace),
        Commands::Status(args) => args.run(&workspace),
    }
}
