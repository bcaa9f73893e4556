//! Detaching a project from the build that used to produce it.

use trellis_core::{ConfigurationStore, Workspace, WorkspaceError, WorkspaceProject, MANAGED_TAG};

use crate::report::{Mutation, SyncReport};

/// Remove the managed tag, the derived markers, resource filters and model
/// tag bookkeeping recorded for `project`, and its persisted configuration.
///
/// Project files are never touched. Returns whether anything changed; calling
/// it on an unmanaged project is a no-op.
pub fn uncouple(
    workspace: &mut dyn Workspace,
    configs: &mut dyn ConfigurationStore,
    project: &WorkspaceProject,
    report: &mut SyncReport,
) -> Result<bool, WorkspaceError> {
    let name = &project.name;
    let mut changed = false;

    let recorded = &project.attributes;
    if !recorded.derived.is_empty() || !recorded.filters.is_empty() || !recorded.model_tags.is_empty()
    {
        let mut attributes = recorded.clone();
        attributes.derived.clear();
        attributes.filters.clear();
        attributes.model_tags.clear();
        if workspace.set_attributes(name, attributes)? {
            report.record(Mutation::AttributesUpdated { name: name.clone() });
            changed = true;
        }
    }

    if workspace.remove_tag(name, MANAGED_TAG)? {
        report.record(Mutation::Untagged {
            name: name.clone(),
            tag: MANAGED_TAG.to_string(),
        });
        changed = true;
    }

    if configs.delete_configuration(project)? {
        report.record(Mutation::ConfigurationDeleted { name: name.clone() });
        changed = true;
    }

    if changed {
        tracing::info!("uncoupled project '{name}' from its build");
        report.record(Mutation::Uncoupled { name: name.clone() });
    }
    Ok(changed)
}
