//! `trellis remove <name>`: drop a project, optionally refreshing afterwards.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use trellis_core::{ProjectName, WorkspaceSession};
use trellis_jobs::{RemovalListener, WorkspaceEvent};

use super::{report, start_runner, wait_for};

/// Arguments for `trellis remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Name of the workspace project.
    pub name: String,

    /// Refresh the remaining builds even when auto-sync is off.
    #[arg(long)]
    pub refresh: bool,
}

impl RemoveArgs {
    pub async fn run(self, workspace: &Path) -> Result<()> {
        let runner = start_runner(workspace)?;
        let name = ProjectName::from(self.name);

        let (removed, auto_sync) = {
            let moved_name = name.clone();
            runner
                .with_workspace(move |ws| {
                    let removed = ws.remove_project(&moved_name)?;
                    ws.flush()?;
                    Ok::<_, trellis_core::WorkspaceError>((removed, ws.settings().auto_sync))
                })
                .await?
                .with_context(|| format!("failed to remove project '{name}'"))?
        };
        println!("{} removed '{}'", "✓".green().bold(), removed.name);

        if auto_sync || self.refresh {
            let listener = RemovalListener::spawn(runner.clone());
            listener.notify(WorkspaceEvent::ProjectRemoved(removed.name))?;
            for handle in listener.stop().await? {
                report(&wait_for(handle).await)?;
            }
        }

        runner.shutdown().await.context("failed to stop job runner")
    }
}
