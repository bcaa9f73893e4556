//! Entry points: which builds to fetch, with which strategy, under which policy.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trellis_core::{
    BuildRootDescriptor, ConfigurationStore, ProjectName, Workspace, WorkspaceError, MANAGED_TAG,
};

use crate::engine::{synchronize, synchronize_project};
use crate::error::{FetchError, SyncError};
use crate::fetch::{FetchOutcome, FetchStrategy, ModelFetcher};
use crate::policy::{BuildScoped, ImportAndMerge, SharedPolicy, SkipNew};
use crate::report::SyncReport;
use crate::view::BuildView;

/// One kind of synchronization run.
#[derive(Clone)]
pub enum SyncScope {
    /// Import a new build alongside the known ones. `policy` applies to the
    /// new build's modules; modules of other builds are never imported.
    ImportBuild {
        root: BuildRootDescriptor,
        policy: SharedPolicy,
    },
    /// Refresh every known build, importing new modules.
    RefreshAll,
    /// Refresh known builds after a project was removed, importing nothing.
    RefreshAfterRemoval,
    /// Re-apply the model to a single project.
    RefreshProject(ProjectName),
}

impl SyncScope {
    pub fn label(&self) -> String {
        match self {
            SyncScope::ImportBuild { root, .. } => {
                format!("import build {}", root.root_dir.display())
            }
            SyncScope::RefreshAll => "refresh all builds".to_string(),
            SyncScope::RefreshAfterRemoval => "refresh builds after removal".to_string(),
            SyncScope::RefreshProject(name) => format!("refresh project {name}"),
        }
    }

    pub fn strategy(&self) -> FetchStrategy {
        match self {
            SyncScope::ImportBuild { .. } | SyncScope::RefreshAll => FetchStrategy::ForceReload,
            SyncScope::RefreshAfterRemoval | SyncScope::RefreshProject(_) => {
                FetchStrategy::LoadIfNotCached
            }
        }
    }
}

impl fmt::Debug for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// How a pipeline run ended when it did not fail.
#[derive(Debug)]
pub enum PipelineOutcome {
    Applied(SyncReport),
    /// Nothing to synchronize, or the model was not available.
    Skipped { reason: String },
}

/// Root descriptors of every build that currently manages an open project,
/// one per root directory.
pub fn known_builds(
    workspace: &dyn Workspace,
    configs: &dyn ConfigurationStore,
) -> Vec<BuildRootDescriptor> {
    let mut roots: Vec<BuildRootDescriptor> = Vec::new();
    for project in workspace.projects() {
        if !project.open || !project.has_tag(MANAGED_TAG) {
            continue;
        }
        if let Some(config) = configs.read_configuration(&project) {
            if !roots.iter().any(|r| r.same_build(&config.root)) {
                roots.push(config.root);
            }
        }
    }
    roots
}

/// Fetch the builds `scope` covers and reconcile the workspace with them.
pub fn run(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    fetcher: &dyn ModelFetcher,
    scope: &SyncScope,
    cancel: &CancellationToken,
) -> Result<PipelineOutcome, SyncError> {
    let mut roots = known_builds(workspace, configs);
    let policy: SharedPolicy = match scope {
        SyncScope::ImportBuild { root, policy } => {
            // An explicit import carries fresh connection parameters.
            roots.retain(|r| !r.same_build(root));
            roots.push(root.clone());
            Arc::new(BuildScoped::new(
                root.root_dir.clone(),
                policy.clone(),
                Arc::new(SkipNew),
            ))
        }
        SyncScope::RefreshAll => Arc::new(ImportAndMerge),
        SyncScope::RefreshAfterRemoval => Arc::new(SkipNew),
        SyncScope::RefreshProject(name) => {
            let project = workspace
                .find_by_name(name)
                .ok_or_else(|| WorkspaceError::UnknownProject { name: name.clone() })?;
            match configs.read_configuration(&project) {
                Some(config) => {
                    if !roots.iter().any(|r| r.same_build(&config.root)) {
                        roots.push(config.root);
                    }
                }
                None => {
                    return Ok(PipelineOutcome::Skipped {
                        reason: format!("project '{name}' is not managed by any build"),
                    })
                }
            }
            Arc::new(SkipNew)
        }
    };

    if roots.is_empty() {
        return Ok(PipelineOutcome::Skipped {
            reason: "no builds to synchronize".to_string(),
        });
    }

    tracing::info!("{}: fetching {} build(s)", scope.label(), roots.len());
    let model = match fetcher.fetch(&roots, scope.strategy(), cancel) {
        Ok(FetchOutcome::Ready(model)) => model,
        Ok(FetchOutcome::NotReady) => {
            return Ok(PipelineOutcome::Skipped {
                reason: "build model not available yet".to_string(),
            })
        }
        Err(FetchError::Cancelled) => {
            return Err(SyncError::Cancelled {
                report: SyncReport::default(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let view = BuildView::new(model, roots);
    let report = match scope {
        SyncScope::RefreshProject(name) => {
            synchronize_project(workspace, configs, &view, name, cancel)?
        }
        _ => synchronize(workspace, configs, &view, policy.as_ref(), cancel)?,
    };
    tracing::info!(
        "{}: {} mutation(s), {} failure(s)",
        scope.label(),
        report.mutations.len(),
        report.failures.len()
    );
    Ok(PipelineOutcome::Applied(report))
}
