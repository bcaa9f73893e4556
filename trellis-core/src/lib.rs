//! Trellis core library: domain types, workspace collaborators, persistence.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`WorkspaceError`]
//! - [`store`]: atomic load / save of workspace state and descriptors
//! - [`workspace`]: [`Workspace`] / [`ConfigurationStore`] traits and [`FileWorkspace`]

pub mod error;
pub mod store;
pub mod types;
pub mod workspace;

pub use error::WorkspaceError;
pub use types::{
    BuildCommand, BuildRootDescriptor, DependencyEntry, DependencyKind, Distribution,
    LanguageSettings, LinkedResource, ModuleAttributes, ModuleDescriptor, ModuleNode,
    ProjectAttributes, ProjectConfiguration, ProjectDescriptor, ProjectName, SourceRoot,
    WorkspaceProject, WorkspaceSettings, WorkspaceState,
};
pub use workspace::{
    ConfigurationStore, ConfigurationTable, FileWorkspace, ProjectTable, Workspace,
    WorkspaceSession, LANGUAGE_TAG, MANAGED_TAG,
};
