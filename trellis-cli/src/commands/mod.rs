pub mod import;
pub mod init;
pub mod refresh;
pub mod remove;
pub mod settings;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use trellis_core::FileWorkspace;
use trellis_jobs::{JobHandle, JobRunner, JobStatus};
use trellis_sync::{FileModelFetcher, SyncScope};

pub fn open_workspace(dir: &Path) -> Result<FileWorkspace> {
    FileWorkspace::open(dir)
        .with_context(|| format!("failed to open workspace at {}", dir.display()))
}

/// A runner over the workspace at `dir`, fetching models from build exports.
pub fn start_runner(dir: &Path) -> Result<Arc<JobRunner<FileWorkspace>>> {
    let workspace = open_workspace(dir)?;
    Ok(Arc::new(JobRunner::start(
        workspace,
        Arc::new(FileModelFetcher::new()),
    )))
}

/// Schedule `scope`, wait for it, then stop the runner.
pub async fn run_scope(dir: &Path, scope: SyncScope) -> Result<()> {
    let runner = start_runner(dir)?;
    let handle = runner
        .schedule(scope, None)
        .await
        .context("failed to schedule synchronization")?;
    let status = wait_for(handle).await;
    runner.shutdown().await.context("failed to stop job runner")?;
    report(&status)
}

/// Wait for a job; Ctrl-C cancels it and waits for it to wind down.
pub async fn wait_for(handle: JobHandle) -> JobStatus {
    tokio::select! {
        status = handle.clone().wait() => status,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("cancelling {}...", handle.label());
            handle.cancel();
            handle.wait().await
        }
    }
}

/// Print a terminal status. Failures become the command's error.
pub fn report(status: &JobStatus) -> Result<()> {
    match status {
        JobStatus::Succeeded(summary) => {
            println!("{} {summary}", "✓".green().bold());
            for name in &summary.imported {
                println!("  +  {name}");
            }
            for name in &summary.uncoupled {
                println!("  -  {name}");
            }
            Ok(())
        }
        JobStatus::Cancelled => {
            println!("{} cancelled", "·".bright_black());
            Ok(())
        }
        JobStatus::Failed(cause) => bail!("synchronization failed: {cause}"),
    }
}
