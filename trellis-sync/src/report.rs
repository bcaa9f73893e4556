//! What a synchronization run changed, and what it failed to change.

use std::path::PathBuf;

use trellis_core::ProjectName;

use crate::error::SyncError;

/// A single applied workspace mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Created { name: ProjectName, directory: PathBuf },
    /// An existing descriptor was brought into the workspace as-is.
    Included { name: ProjectName, directory: PathBuf },
    DescriptorDeleted { directory: PathBuf },
    Renamed { from: ProjectName, to: ProjectName },
    /// A name holder was moved aside so another project could take its name.
    TemporarilyRenamed { from: ProjectName, to: ProjectName },
    Tagged { name: ProjectName, tag: String },
    Untagged { name: ProjectName, tag: String },
    ConfigurationSaved { name: ProjectName },
    ConfigurationDeleted { name: ProjectName },
    AttributesUpdated { name: ProjectName },
    Imported { name: ProjectName },
    Uncoupled { name: ProjectName },
}

/// A module whose update was aborted.
#[derive(Debug)]
pub struct ModuleFailure {
    pub module: ProjectName,
    pub directory: PathBuf,
    pub error: SyncError,
}

/// Outcome of one synchronization run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub mutations: Vec<Mutation>,
    pub failures: Vec<ModuleFailure>,
    /// Modules not attempted because an ancestor module failed.
    pub skipped: Vec<ProjectName>,
}

impl SyncReport {
    pub(crate) fn record(&mut self, mutation: Mutation) {
        tracing::debug!("{mutation:?}");
        self.mutations.push(mutation);
    }

    /// True when the run left the workspace exactly as it found it.
    pub fn is_noop(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    /// Names of projects newly brought into the workspace.
    pub fn imported(&self) -> Vec<&ProjectName> {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::Imported { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Names of projects uncoupled from their build.
    pub fn uncoupled(&self) -> Vec<&ProjectName> {
        self.mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::Uncoupled { name } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// One line per failure, for status callbacks and the CLI.
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.error.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
