//! `trellis refresh` and `trellis refresh-project <name>`

use std::path::Path;

use anyhow::Result;
use clap::Args;

use trellis_sync::SyncScope;

use super::run_scope;

/// Arguments for `trellis refresh`.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Only update and uncouple existing projects; import nothing new.
    #[arg(long)]
    pub no_import: bool,
}

impl RefreshArgs {
    pub async fn run(self, workspace: &Path) -> Result<()> {
        let scope = if self.no_import {
            SyncScope::RefreshAfterRemoval
        } else {
            SyncScope::RefreshAll
        };
        run_scope(workspace, scope).await
    }
}

/// Arguments for `trellis refresh-project`.
#[derive(Args, Debug)]
pub struct RefreshProjectArgs {
    /// Name of the workspace project.
    pub name: String,
}

impl RefreshProjectArgs {
    pub async fn run(self, workspace: &Path) -> Result<()> {
        run_scope(workspace, SyncScope::RefreshProject(self.name.into())).await
    }
}
