//! `trellis init [--distribution <dist>] [--offline] [--auto-sync]`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use trellis_core::{store, WorkspaceSettings};

use super::settings::print_settings;
use crate::DistributionArg;

/// Create the workspace state with its initial defaults.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Tool distribution: wrapper | version:<v> | local:<dir> | remote:<uri>.
    #[arg(long, value_name = "DIST")]
    pub distribution: Option<DistributionArg>,

    /// Run the build tool without network access by default.
    #[arg(long)]
    pub offline: bool,

    /// Refresh builds automatically after a project is removed.
    #[arg(long)]
    pub auto_sync: bool,
}

impl InitArgs {
    pub fn run(self, workspace: &Path) -> Result<()> {
        let existed = store::state_path_at(workspace).exists();
        let settings = WorkspaceSettings {
            distribution: self.distribution.map(Into::into).unwrap_or_default(),
            offline: self.offline,
            auto_sync: self.auto_sync,
            ..Default::default()
        };
        let state = store::init_at(workspace, settings)
            .with_context(|| format!("failed to init workspace at {}", workspace.display()))?;

        if existed {
            println!(
                "{} workspace at {} already exists; settings unchanged",
                "·".bright_black(),
                workspace.display()
            );
        } else {
            println!(
                "{} initialized workspace at {}",
                "✓".green().bold(),
                workspace.display()
            );
        }
        print_settings(&state.settings);
        Ok(())
    }
}
