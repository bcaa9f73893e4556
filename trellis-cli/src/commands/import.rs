//! `trellis import <root>`: bring a build's modules into the workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use trellis_core::BuildRootDescriptor;
use trellis_sync::{with_working_sets, ImportAndMerge, ImportAndOverwrite, SharedPolicy, SyncScope};

use super::{open_workspace, run_scope};
use crate::DistributionArg;

/// Arguments for `trellis import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Root directory of the build.
    pub root: PathBuf,

    /// Replace project descriptors found in module directories instead of
    /// keeping them.
    #[arg(long)]
    pub overwrite: bool,

    /// Add imported projects to this working set. Repeatable.
    #[arg(long = "working-set", value_name = "NAME")]
    pub working_sets: Vec<String>,

    /// Tool distribution: wrapper | version:<v> | local:<dir> | remote:<uri>.
    #[arg(long, value_name = "DIST")]
    pub distribution: Option<DistributionArg>,

    /// Run the build tool without network access.
    #[arg(long)]
    pub offline: bool,

    /// Home directory for the build tool.
    #[arg(long, value_name = "DIR")]
    pub user_home: Option<PathBuf>,

    /// Extra argument passed to the build tool. Repeatable.
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub arguments: Vec<String>,
}

impl ImportArgs {
    pub async fn run(self, workspace: &Path) -> Result<()> {
        let root = fs::canonicalize(&self.root)
            .with_context(|| format!("build root {} does not exist", self.root.display()))?;
        let settings = open_workspace(workspace)?.settings().clone();

        let mut descriptor = BuildRootDescriptor::with_settings(root, &settings);
        if let Some(distribution) = self.distribution {
            descriptor.distribution = distribution.into();
        }
        if self.offline {
            descriptor.offline = true;
        }
        if self.user_home.is_some() {
            descriptor.user_home = self.user_home;
        }
        if !self.arguments.is_empty() {
            descriptor.arguments = self.arguments;
        }

        let mut policy: SharedPolicy = if self.overwrite {
            Arc::new(ImportAndOverwrite)
        } else {
            Arc::new(ImportAndMerge)
        };
        if !self.working_sets.is_empty() {
            policy = with_working_sets(policy, self.working_sets);
        }

        run_scope(
            workspace,
            SyncScope::ImportBuild {
                root: descriptor,
                policy,
            },
        )
        .await
    }
}
