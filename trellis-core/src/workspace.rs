//! Collaborator interfaces for the reconciliation engine, and the file-backed
//! workspace that implements them.
//!
//! The engine never reaches a global: it receives a [`Workspace`] (project
//! primitives) and a [`ConfigurationStore`] (persisted build links) and only
//! talks to those. [`FileWorkspace`] keeps both in memory and persists them to
//! `<root>/.trellis/workspace.yaml` on [`WorkspaceSession::flush`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::WorkspaceError;
use crate::store;
use crate::types::{
    ProjectAttributes, ProjectConfiguration, ProjectDescriptor, ProjectName, WorkspaceProject,
    WorkspaceSettings, WorkspaceState,
};

/// Marks a project as governed by the reconciliation engine.
pub const MANAGED_TAG: &str = "trellis.managed";
/// Marks a project as promoted to the typed (language-aware) state.
pub const LANGUAGE_TAG: &str = "trellis.language";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Atomic operations on local project entities.
///
/// Lookups return snapshots; mutations address projects by name. Methods
/// returning `bool` report whether anything actually changed.
pub trait Workspace {
    fn projects(&self) -> Vec<WorkspaceProject>;

    fn find_by_location(&self, dir: &Path) -> Option<WorkspaceProject>;

    fn find_by_name(&self, name: &ProjectName) -> Option<WorkspaceProject>;

    /// Create an open project at `dir` and write a fresh descriptor there.
    fn create_project(
        &mut self,
        name: &ProjectName,
        dir: &Path,
        tags: &BTreeSet<String>,
    ) -> Result<WorkspaceProject, WorkspaceError>;

    /// Bring an existing on-disk descriptor into the workspace as-is.
    fn include_project(
        &mut self,
        descriptor: &ProjectDescriptor,
    ) -> Result<WorkspaceProject, WorkspaceError>;

    fn rename_project(
        &mut self,
        name: &ProjectName,
        new_name: &ProjectName,
    ) -> Result<WorkspaceProject, WorkspaceError>;

    fn add_tag(&mut self, name: &ProjectName, tag: &str) -> Result<bool, WorkspaceError>;

    fn remove_tag(&mut self, name: &ProjectName, tag: &str) -> Result<bool, WorkspaceError>;

    /// A descriptor in `dir` that no workspace project owns.
    fn find_unmanaged_descriptor(
        &self,
        dir: &Path,
    ) -> Result<Option<ProjectDescriptor>, WorkspaceError>;

    fn delete_descriptor(&mut self, dir: &Path) -> Result<(), WorkspaceError>;

    fn set_attributes(
        &mut self,
        name: &ProjectName,
        attributes: ProjectAttributes,
    ) -> Result<bool, WorkspaceError>;

    fn add_to_working_sets(
        &mut self,
        name: &ProjectName,
        sets: &[String],
    ) -> Result<bool, WorkspaceError>;

    fn set_open(&mut self, name: &ProjectName, open: bool) -> Result<bool, WorkspaceError>;

    /// Forget the project entity. Files on disk are left alone.
    fn delete_project(&mut self, name: &ProjectName) -> Result<WorkspaceProject, WorkspaceError>;
}

/// Persisted [`ProjectConfiguration`]s, one per managed project.
pub trait ConfigurationStore {
    fn read_configuration(&self, project: &WorkspaceProject) -> Option<ProjectConfiguration>;

    fn save_configuration(
        &mut self,
        project: &WorkspaceProject,
        configuration: &ProjectConfiguration,
    ) -> Result<bool, WorkspaceError>;

    /// Idempotent; returns whether a configuration was removed.
    fn delete_configuration(&mut self, project: &WorkspaceProject)
        -> Result<bool, WorkspaceError>;
}

/// A workspace a job can hold exclusively and commit when done.
pub trait WorkspaceSession: Send + 'static {
    fn parts(&mut self) -> (&mut dyn Workspace, &mut dyn ConfigurationStore);

    fn flush(&mut self) -> Result<(), WorkspaceError>;
}

// ---------------------------------------------------------------------------
// Project table
// ---------------------------------------------------------------------------

/// In-memory project entities; descriptor files live on disk.
#[derive(Debug, Default)]
pub struct ProjectTable {
    projects: Vec<WorkspaceProject>,
}

impl ProjectTable {
    fn position(&self, name: &ProjectName) -> Result<usize, WorkspaceError> {
        self.projects
            .iter()
            .position(|p| &p.name == name)
            .ok_or_else(|| WorkspaceError::UnknownProject { name: name.clone() })
    }

    fn ensure_free(&self, name: &ProjectName, dir: &Path) -> Result<(), WorkspaceError> {
        if let Some(owner) = self.projects.iter().find(|p| p.is_at(dir)) {
            return Err(WorkspaceError::LocationTaken {
                directory: dir.to_path_buf(),
                owner: owner.name.clone(),
            });
        }
        if self.projects.iter().any(|p| &p.name == name) {
            return Err(WorkspaceError::NameTaken { name: name.clone() });
        }
        Ok(())
    }

    fn snapshot(project: &WorkspaceProject) -> WorkspaceProject {
        let mut project = project.clone();
        project.has_descriptor = project
            .directory
            .as_deref()
            .map(|dir| store::descriptor_path(dir).exists())
            .unwrap_or(false);
        project
    }

    fn insert(
        &mut self,
        name: &ProjectName,
        dir: &Path,
        tags: BTreeSet<String>,
    ) -> WorkspaceProject {
        let project = WorkspaceProject {
            name: name.clone(),
            directory: Some(dir.to_path_buf()),
            open: true,
            tags,
            has_descriptor: true,
            attributes: ProjectAttributes::default(),
            working_sets: BTreeSet::new(),
        };
        self.projects.push(project.clone());
        project
    }
}

impl Workspace for ProjectTable {
    fn projects(&self) -> Vec<WorkspaceProject> {
        self.projects.iter().map(Self::snapshot).collect()
    }

    fn find_by_location(&self, dir: &Path) -> Option<WorkspaceProject> {
        self.projects.iter().find(|p| p.is_at(dir)).map(Self::snapshot)
    }

    fn find_by_name(&self, name: &ProjectName) -> Option<WorkspaceProject> {
        self.projects
            .iter()
            .find(|p| &p.name == name)
            .map(Self::snapshot)
    }

    fn create_project(
        &mut self,
        name: &ProjectName,
        dir: &Path,
        tags: &BTreeSet<String>,
    ) -> Result<WorkspaceProject, WorkspaceError> {
        self.ensure_free(name, dir)?;
        store::write_descriptor(&ProjectDescriptor {
            name: name.clone(),
            tags: tags.clone(),
            directory: dir.to_path_buf(),
        })?;
        Ok(self.insert(name, dir, tags.clone()))
    }

    fn include_project(
        &mut self,
        descriptor: &ProjectDescriptor,
    ) -> Result<WorkspaceProject, WorkspaceError> {
        self.ensure_free(&descriptor.name, &descriptor.directory)?;
        Ok(self.insert(
            &descriptor.name,
            &descriptor.directory,
            descriptor.tags.clone(),
        ))
    }

    fn rename_project(
        &mut self,
        name: &ProjectName,
        new_name: &ProjectName,
    ) -> Result<WorkspaceProject, WorkspaceError> {
        let idx = self.position(name)?;
        if name == new_name {
            return Ok(Self::snapshot(&self.projects[idx]));
        }
        if self.projects.iter().any(|p| &p.name == new_name) {
            return Err(WorkspaceError::NameTaken {
                name: new_name.clone(),
            });
        }
        if let Some(dir) = self.projects[idx].directory.clone() {
            if let Some(mut descriptor) = store::read_descriptor_at(&dir)? {
                descriptor.name = new_name.clone();
                store::write_descriptor(&descriptor)?;
            }
        }
        self.projects[idx].name = new_name.clone();
        Ok(Self::snapshot(&self.projects[idx]))
    }

    fn add_tag(&mut self, name: &ProjectName, tag: &str) -> Result<bool, WorkspaceError> {
        let idx = self.position(name)?;
        Ok(self.projects[idx].tags.insert(tag.to_string()))
    }

    fn remove_tag(&mut self, name: &ProjectName, tag: &str) -> Result<bool, WorkspaceError> {
        let idx = self.position(name)?;
        Ok(self.projects[idx].tags.remove(tag))
    }

    fn find_unmanaged_descriptor(
        &self,
        dir: &Path,
    ) -> Result<Option<ProjectDescriptor>, WorkspaceError> {
        if self.projects.iter().any(|p| p.is_at(dir)) {
            return Ok(None);
        }
        store::read_descriptor_at(dir)
    }

    fn delete_descriptor(&mut self, dir: &Path) -> Result<(), WorkspaceError> {
        store::delete_descriptor_at(dir)
    }

    fn set_attributes(
        &mut self,
        name: &ProjectName,
        attributes: ProjectAttributes,
    ) -> Result<bool, WorkspaceError> {
        let idx = self.position(name)?;
        if self.projects[idx].attributes == attributes {
            return Ok(false);
        }
        self.projects[idx].attributes = attributes;
        Ok(true)
    }

    fn add_to_working_sets(
        &mut self,
        name: &ProjectName,
        sets: &[String],
    ) -> Result<bool, WorkspaceError> {
        let idx = self.position(name)?;
        let mut changed = false;
        for set in sets {
            changed |= self.projects[idx].working_sets.insert(set.clone());
        }
        Ok(changed)
    }

    fn set_open(&mut self, name: &ProjectName, open: bool) -> Result<bool, WorkspaceError> {
        let idx = self.position(name)?;
        let changed = self.projects[idx].open != open;
        self.projects[idx].open = open;
        Ok(changed)
    }

    fn delete_project(&mut self, name: &ProjectName) -> Result<WorkspaceProject, WorkspaceError> {
        let idx = self.position(name)?;
        Ok(self.projects.remove(idx))
    }
}

// ---------------------------------------------------------------------------
// Configuration table
// ---------------------------------------------------------------------------

/// Project configurations keyed by project directory.
#[derive(Debug, Default)]
pub struct ConfigurationTable {
    entries: BTreeMap<PathBuf, ProjectConfiguration>,
}

impl ConfigurationTable {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigurationStore for ConfigurationTable {
    fn read_configuration(&self, project: &WorkspaceProject) -> Option<ProjectConfiguration> {
        project
            .directory
            .as_ref()
            .and_then(|dir| self.entries.get(dir))
            .cloned()
    }

    fn save_configuration(
        &mut self,
        project: &WorkspaceProject,
        configuration: &ProjectConfiguration,
    ) -> Result<bool, WorkspaceError> {
        let dir = project
            .directory
            .clone()
            .ok_or_else(|| WorkspaceError::NoLocation {
                name: project.name.clone(),
            })?;
        if self.entries.get(&dir) == Some(configuration) {
            return Ok(false);
        }
        self.entries.insert(dir, configuration.clone());
        Ok(true)
    }

    fn delete_configuration(
        &mut self,
        project: &WorkspaceProject,
    ) -> Result<bool, WorkspaceError> {
        Ok(project
            .directory
            .as_ref()
            .map(|dir| self.entries.remove(dir).is_some())
            .unwrap_or(false))
    }
}

// ---------------------------------------------------------------------------
// File workspace
// ---------------------------------------------------------------------------

/// A workspace rooted at a directory, persisted in `.trellis/workspace.yaml`.
#[derive(Debug)]
pub struct FileWorkspace {
    root: PathBuf,
    settings: WorkspaceSettings,
    updated_at: DateTime<Utc>,
    projects: ProjectTable,
    configurations: ConfigurationTable,
}

impl FileWorkspace {
    /// Open the workspace at `root`, starting empty if nothing was saved yet.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        let state = store::load_or_default_at(&root)?;
        Ok(Self::from_state(root, state))
    }

    pub fn from_state(root: impl Into<PathBuf>, state: WorkspaceState) -> Self {
        Self {
            root: root.into(),
            settings: state.settings,
            updated_at: state.updated_at,
            projects: ProjectTable {
                projects: state.projects,
            },
            configurations: ConfigurationTable {
                entries: state.configurations,
            },
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut WorkspaceSettings {
        &mut self.settings
    }

    pub fn projects(&self) -> &ProjectTable {
        &self.projects
    }

    pub fn projects_mut(&mut self) -> &mut ProjectTable {
        &mut self.projects
    }

    pub fn configurations(&self) -> &ConfigurationTable {
        &self.configurations
    }

    /// Last time the state was flushed to disk.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Snapshot of everything that would be persisted.
    pub fn state(&self) -> WorkspaceState {
        WorkspaceState {
            version: 1,
            settings: self.settings.clone(),
            projects: self.projects.projects.clone(),
            configurations: self.configurations.entries.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Delete a project and its configuration; files stay on disk.
    pub fn remove_project(
        &mut self,
        name: &ProjectName,
    ) -> Result<WorkspaceProject, WorkspaceError> {
        let removed = self.projects.delete_project(name)?;
        self.configurations.delete_configuration(&removed)?;
        Ok(removed)
    }
}

impl WorkspaceSession for FileWorkspace {
    fn parts(&mut self) -> (&mut dyn Workspace, &mut dyn ConfigurationStore) {
        (&mut self.projects, &mut self.configurations)
    }

    fn flush(&mut self) -> Result<(), WorkspaceError> {
        let mut state = self.state();
        store::save_state_at(&self.root, &mut state)?;
        self.updated_at = state.updated_at;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
