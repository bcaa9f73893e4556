//! `trellis settings`: workspace defaults for newly imported builds.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use trellis_core::{WorkspaceSession, WorkspaceSettings};

use super::open_workspace;
use crate::DistributionArg;

/// Arguments for `trellis settings`. Without flags, prints the current values.
#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Tool distribution: wrapper | version:<v> | local:<dir> | remote:<uri>.
    #[arg(long, value_name = "DIST")]
    pub distribution: Option<DistributionArg>,

    /// Run the build tool without network access by default.
    #[arg(long, value_name = "BOOL")]
    pub offline: Option<bool>,

    /// Home directory for the build tool.
    #[arg(long, value_name = "DIR", conflicts_with = "clear_user_home")]
    pub user_home: Option<PathBuf>,

    /// Forget the configured tool home directory.
    #[arg(long)]
    pub clear_user_home: bool,

    /// Default extra argument for the build tool. Repeatable; replaces the
    /// current list.
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub arguments: Vec<String>,

    /// Forget the default extra arguments.
    #[arg(long, conflicts_with = "arguments")]
    pub clear_args: bool,

    /// Refresh builds automatically after a project is removed.
    #[arg(long, value_name = "BOOL")]
    pub auto_sync: Option<bool>,
}

impl SettingsArgs {
    pub fn run(self, workspace: &Path) -> Result<()> {
        let mut ws = open_workspace(workspace)?;
        if self.apply(ws.settings_mut()) {
            ws.flush()
                .with_context(|| format!("failed to save workspace at {}", workspace.display()))?;
            println!("{} settings updated", "✓".green().bold());
        }
        print_settings(ws.settings());
        Ok(())
    }

    /// Returns whether any setting was requested.
    fn apply(self, settings: &mut WorkspaceSettings) -> bool {
        let mut touched = false;
        if let Some(distribution) = self.distribution {
            settings.distribution = distribution.into();
            touched = true;
        }
        if let Some(offline) = self.offline {
            settings.offline = offline;
            touched = true;
        }
        if self.user_home.is_some() || self.clear_user_home {
            settings.user_home = self.user_home;
            touched = true;
        }
        if !self.arguments.is_empty() || self.clear_args {
            settings.arguments = self.arguments;
            touched = true;
        }
        if let Some(auto_sync) = self.auto_sync {
            settings.auto_sync = auto_sync;
            touched = true;
        }
        touched
    }
}

pub(super) fn print_settings(settings: &WorkspaceSettings) {
    let user_home = settings
        .user_home
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    let arguments = if settings.arguments.is_empty() {
        "-".to_string()
    } else {
        settings.arguments.join(" ")
    };
    println!("{:<14}{}", "distribution", settings.distribution);
    println!("{:<14}{}", "offline", settings.offline);
    println!("{:<14}{}", "user home", user_home);
    println!("{:<14}{}", "arguments", arguments);
    println!("{:<14}{}", "auto sync", settings.auto_sync);
}
