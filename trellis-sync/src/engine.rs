//! The reconciliation engine: applies a [`BuildView`] to a workspace.
//!
//! One run has two phases. First, open managed projects whose build is being
//! synchronized but whose directory no longer holds a module are uncoupled,
//! so names and directories they held are free. Then every module of the view
//! is reconciled in pre-order. A failing module is recorded in the report and
//! its subtree is skipped; unrelated modules are still applied.
//!
//! Every primitive call is compare-then-apply, so a second run against an
//! unchanged model records no mutations.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use trellis_core::{
    ConfigurationStore, ModuleDescriptor, ProjectAttributes, ProjectConfiguration, ProjectName,
    Workspace, WorkspaceError, WorkspaceProject, LANGUAGE_TAG, MANAGED_TAG,
};

use crate::error::SyncError;
use crate::fetch::TOOL_DIR;
use crate::policy::NewProjectPolicy;
use crate::report::{ModuleFailure, Mutation, SyncReport};
use crate::uncouple::uncouple;
use crate::view::BuildView;

/// Suffix given to a project moved out of the way of another project's name.
pub const TEMPORARY_SUFFIX: &str = "-trellis-rename";

/// Make the workspace match `view`.
///
/// Returns `Err` only for cancellation; per-module problems end up in
/// [`SyncReport::failures`].
pub fn synchronize(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    view: &BuildView,
    policy: &dyn NewProjectPolicy,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled { report });
    }

    let decoupled = decoupled_projects(workspace, configs, view);
    tracing::debug!(
        "synchronizing {} module(s) from {} build(s), {} decoupled project(s)",
        view.modules().len(),
        view.roots().len(),
        decoupled.len()
    );
    for project in decoupled {
        if let Err(e) = uncouple(workspace, configs, &project, &mut report) {
            tracing::error!("cannot uncouple project '{}': {e}", project.name);
            report.failures.push(ModuleFailure {
                module: project.name.clone(),
                directory: project.directory.clone().unwrap_or_default(),
                error: SyncError::Module {
                    module: project.name,
                    source: Box::new(e.into()),
                },
            });
        }
    }

    // Directories of modules that failed or were skipped; their subtrees are skipped too.
    let mut aborted: HashSet<PathBuf> = HashSet::new();
    for module in view.modules() {
        if cancel.is_cancelled() {
            tracing::info!("synchronization cancelled before module '{}'", module.name);
            return Err(SyncError::Cancelled { report });
        }
        if module.parent.as_ref().is_some_and(|p| aborted.contains(p)) {
            tracing::debug!("skipping module '{}': an ancestor failed", module.name);
            aborted.insert(module.directory.clone());
            report.skipped.push(module.name.clone());
            continue;
        }
        let outcome = synchronize_module(
            workspace,
            configs,
            view,
            policy,
            module,
            Some(&aborted),
            &mut report,
        );
        if let Err(e) = outcome {
            tracing::error!("cannot synchronize module '{}': {e}", module.name);
            aborted.insert(module.directory.clone());
            report.failures.push(ModuleFailure {
                module: module.name.clone(),
                directory: module.directory.clone(),
                error: SyncError::Module {
                    module: module.name.clone(),
                    source: Box::new(e),
                },
            });
        }
    }

    Ok(report)
}

/// Re-apply the build model to a single project.
///
/// An open project backed by a module of `view` gets the open-project update;
/// one whose build is in `view` but whose module is gone is uncoupled;
/// anything else is left alone. Safe to call repeatedly.
pub fn synchronize_project(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    view: &BuildView,
    name: &ProjectName,
    cancel: &CancellationToken,
) -> Result<SyncReport, SyncError> {
    let mut report = SyncReport::default();
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled { report });
    }
    let project = workspace
        .find_by_name(name)
        .ok_or_else(|| WorkspaceError::UnknownProject { name: name.clone() })?;
    if !project.open {
        tracing::debug!("project '{name}' is closed, leaving it untouched");
        return Ok(report);
    }
    let Some(config) = configs.read_configuration(&project) else {
        tracing::debug!("project '{name}' is not managed, nothing to do");
        return Ok(report);
    };
    if !view.has_root(&config.root) {
        return Ok(report);
    }

    match project.directory.as_deref().and_then(|dir| view.module_at(dir)) {
        Some(module) => {
            let outcome = synchronize_open_project(
                workspace,
                configs,
                view,
                &project,
                module,
                None,
                &mut report,
            );
            outcome.map_err(|e| SyncError::Module {
                module: module.name.clone(),
                source: Box::new(e),
            })?;
        }
        None => {
            uncouple(workspace, configs, &project, &mut report)?;
        }
    }
    Ok(report)
}

/// Open projects managed by one of the view's builds but backed by no module.
fn decoupled_projects(
    workspace: &dyn Workspace,
    configs: &dyn ConfigurationStore,
    view: &BuildView,
) -> Vec<WorkspaceProject> {
    workspace
        .projects()
        .into_iter()
        .filter(|p| p.open && p.has_tag(MANAGED_TAG))
        .filter(|p| {
            configs
                .read_configuration(p)
                .is_some_and(|c| view.has_root(&c.root))
        })
        .filter(|p| match p.directory.as_deref() {
            Some(dir) => view.model().find_by_dir(dir).is_none(),
            None => true,
        })
        .collect()
}

fn synchronize_module(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    view: &BuildView,
    policy: &dyn NewProjectPolicy,
    module: &ModuleDescriptor,
    aborted: Option<&HashSet<PathBuf>>,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    match workspace.find_by_location(&module.directory) {
        Some(project) if project.open => {
            synchronize_open_project(workspace, configs, view, &project, module, aborted, report)
        }
        Some(project) => {
            tracing::debug!("project '{}' is closed, leaving it untouched", project.name);
            Ok(())
        }
        None => import_module(workspace, configs, view, policy, module, aborted, report),
    }
}

fn import_module(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    view: &BuildView,
    policy: &dyn NewProjectPolicy,
    module: &ModuleDescriptor,
    aborted: Option<&HashSet<PathBuf>>,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    if !policy.should_import(module) {
        tracing::debug!("not importing module '{}'", module.name);
        return Ok(());
    }

    let existing = workspace.find_unmanaged_descriptor(&module.directory)?;
    let project = match existing {
        Some(descriptor) if !policy.should_overwrite_descriptor(&descriptor, module) => {
            // The included project keeps the descriptor's name until the open
            // update renames it, so both names must be clear before including.
            if descriptor.name != module.name {
                name_holder_to_move(workspace, view, &module.name, &module.directory, aborted)?;
            }
            ensure_name_free(workspace, view, &descriptor.name, &module.directory, aborted, report)?;
            let project = workspace.include_project(&descriptor)?;
            report.record(Mutation::Included {
                name: project.name.clone(),
                directory: module.directory.clone(),
            });
            project
        }
        existing => {
            ensure_name_free(workspace, view, &module.name, &module.directory, aborted, report)?;
            if existing.is_some() {
                workspace.delete_descriptor(&module.directory)?;
                report.record(Mutation::DescriptorDeleted {
                    directory: module.directory.clone(),
                });
            }
            let project =
                workspace.create_project(&module.name, &module.directory, &BTreeSet::new())?;
            report.record(Mutation::Created {
                name: project.name.clone(),
                directory: module.directory.clone(),
            });
            project
        }
    };

    synchronize_open_project(workspace, configs, view, &project, module, aborted, report)?;

    let imported = workspace
        .find_by_location(&module.directory)
        .ok_or_else(|| WorkspaceError::UnknownProject {
            name: module.name.clone(),
        })?;
    policy.after_import(workspace, &imported, module)?;
    report.record(Mutation::Imported {
        name: imported.name,
    });
    Ok(())
}

/// Bring an open project in line with its module.
fn synchronize_open_project(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    view: &BuildView,
    project: &WorkspaceProject,
    module: &ModuleDescriptor,
    aborted: Option<&HashSet<PathBuf>>,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    let root = view.root_for(module).ok_or_else(|| SyncError::NotInBuild {
        module: module.name.clone(),
        directory: module.directory.clone(),
    })?;

    let mut project = project.clone();
    if project.name != module.name {
        ensure_name_free(workspace, view, &module.name, &module.directory, aborted, report)?;
        let from = project.name.clone();
        project = workspace.rename_project(&from, &module.name)?;
        report.record(Mutation::Renamed {
            from,
            to: module.name.clone(),
        });
    }
    let name = project.name.clone();

    tag(workspace, &name, MANAGED_TAG, report)?;

    let configuration = ProjectConfiguration {
        root: root.clone(),
        module_path: module.path.clone(),
    };
    if configs.save_configuration(&project, &configuration)? {
        report.record(Mutation::ConfigurationSaved { name: name.clone() });
    }

    let previous_tags: &[String] = &project.attributes.model_tags;
    for stale in previous_tags
        .iter()
        .filter(|t| !module.attributes.tags.contains(t))
    {
        if workspace.remove_tag(&name, stale)? {
            report.record(Mutation::Untagged {
                name: name.clone(),
                tag: stale.clone(),
            });
        }
    }
    for wanted in &module.attributes.tags {
        tag(workspace, &name, wanted, report)?;
    }
    if module.attributes.language.is_some() {
        tag(workspace, &name, LANGUAGE_TAG, report)?;
    }

    let attributes = desired_attributes(&project.attributes, module);
    if workspace.set_attributes(&name, attributes)? {
        report.record(Mutation::AttributesUpdated { name });
    }
    Ok(())
}

fn tag(
    workspace: &mut dyn Workspace,
    name: &ProjectName,
    tag: &str,
    report: &mut SyncReport,
) -> Result<(), WorkspaceError> {
    if workspace.add_tag(name, tag)? {
        report.record(Mutation::Tagged {
            name: name.clone(),
            tag: tag.to_string(),
        });
    }
    Ok(())
}

/// The attributes `module` asks for, given what the project has now.
///
/// Language-specific parts only follow the model for typed modules; an
/// untyped module leaves whatever the project already carries.
fn desired_attributes(
    current: &ProjectAttributes,
    module: &ModuleDescriptor,
) -> ProjectAttributes {
    let dir = &module.directory;
    let mut filters: Vec<PathBuf> = module
        .children
        .iter()
        .map(|child| relative_to(dir, child))
        .collect();
    filters.push(relative_to(dir, &module.build_dir));
    filters.push(PathBuf::from(TOOL_DIR));

    let model = &module.attributes;
    let typed = model.language.is_some();
    ProjectAttributes {
        linked_resources: model.linked_resources.clone(),
        filters,
        derived: vec![relative_to(dir, &module.build_dir)],
        build_commands: model.build_commands.clone(),
        source_roots: if typed {
            model.source_roots.clone()
        } else {
            current.source_roots.clone()
        },
        language: if typed {
            model.language.clone()
        } else {
            current.language.clone()
        },
        dependencies: if typed {
            model.dependencies.clone()
        } else {
            current.dependencies.clone()
        },
        model_tags: model.tags.clone(),
    }
}

fn relative_to(base: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Make `name` available for the project at `directory`.
///
/// A different holder is moved to a temporary name only if the rest of the
/// run will rename it anyway; otherwise the module cannot be applied.
fn ensure_name_free(
    workspace: &mut dyn Workspace,
    view: &BuildView,
    name: &ProjectName,
    directory: &Path,
    aborted: Option<&HashSet<PathBuf>>,
    report: &mut SyncReport,
) -> Result<(), SyncError> {
    let Some(holder) = name_holder_to_move(workspace, view, name, directory, aborted)? else {
        return Ok(());
    };

    let temporary = temporary_name(workspace, &holder.name);
    tracing::debug!("moving '{}' aside as '{temporary}'", holder.name);
    workspace.rename_project(&holder.name, &temporary)?;
    report.record(Mutation::TemporarilyRenamed {
        from: holder.name,
        to: temporary,
    });
    Ok(())
}

/// The project that has to be moved aside before `name` can be given to the
/// project at `directory`, if any. Changes nothing.
///
/// `aborted` holds the directories of modules that failed or were skipped so
/// far in a full run; `None` means no other module runs after this one.
fn name_holder_to_move(
    workspace: &dyn Workspace,
    view: &BuildView,
    name: &ProjectName,
    directory: &Path,
    aborted: Option<&HashSet<PathBuf>>,
) -> Result<Option<WorkspaceProject>, SyncError> {
    let Some(holder) = workspace.find_by_name(name) else {
        return Ok(None);
    };
    if holder.is_at(directory) {
        return Ok(None);
    }
    if aborted.is_some_and(|aborted| due_for_rename(view, aborted, &holder)) {
        return Ok(Some(holder));
    }
    Err(SyncError::NamingConflict {
        name: name.clone(),
        directory: directory.to_path_buf(),
        holder: holder.name,
    })
}

/// Whether a later module of this run will give `holder` a different name.
fn due_for_rename(
    view: &BuildView,
    aborted: &HashSet<PathBuf>,
    holder: &WorkspaceProject,
) -> bool {
    if !holder.open {
        return false;
    }
    let Some(module) = holder.directory.as_deref().and_then(|dir| view.module_at(dir)) else {
        return false;
    };
    if module.name == holder.name {
        return false;
    }
    // A module is not applied once it or any ancestor has failed.
    let mut current = Some(module);
    while let Some(m) = current {
        if aborted.contains(&m.directory) {
            return false;
        }
        current = m.parent.as_deref().and_then(|parent| view.module_at(parent));
    }
    true
}

fn temporary_name(workspace: &dyn Workspace, name: &ProjectName) -> ProjectName {
    let base = format!("{name}{TEMPORARY_SUFFIX}");
    let mut candidate = ProjectName::from(base.clone());
    let mut n = 2;
    while workspace.find_by_name(&candidate).is_some() {
        candidate = ProjectName::from(format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{LanguageSettings, ModuleAttributes, SourceRoot};

    fn module(dir: &str, children: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor {
            name: ProjectName::from("m"),
            path: ":m".into(),
            directory: PathBuf::from(dir),
            root_dir: PathBuf::from(dir),
            parent: None,
            children: children.iter().map(PathBuf::from).collect(),
            build_dir: PathBuf::from(dir).join("build"),
            attributes: ModuleAttributes::default(),
        }
    }

    #[test]
    fn filters_cover_children_build_dir_and_tool_dir() {
        let attrs = desired_attributes(&ProjectAttributes::default(), &module("/p", &["/p/lib"]));
        assert_eq!(
            attrs.filters,
            vec![
                PathBuf::from("lib"),
                PathBuf::from("build"),
                PathBuf::from(".buildtool")
            ]
        );
        assert_eq!(attrs.derived, vec![PathBuf::from("build")]);
    }

    #[test]
    fn untyped_module_keeps_existing_language_state() {
        let current = ProjectAttributes {
            source_roots: vec![SourceRoot {
                path: "src".into(),
                output: None,
            }],
            ..Default::default()
        };
        let attrs = desired_attributes(&current, &module("/p", &[]));
        assert_eq!(attrs.source_roots, current.source_roots);

        let mut typed = module("/p", &[]);
        typed.attributes.language = Some(LanguageSettings {
            source_level: "17".into(),
            target_level: "17".into(),
        });
        let attrs = desired_attributes(&current, &typed);
        assert!(attrs.source_roots.is_empty());
        assert!(attrs.language.is_some());
    }

    #[test]
    fn build_dir_outside_module_stays_absolute() {
        let mut m = module("/p", &[]);
        m.build_dir = PathBuf::from("/out/p");
        let attrs = desired_attributes(&ProjectAttributes::default(), &m);
        assert_eq!(attrs.derived, vec![PathBuf::from("/out/p")]);
    }
}
