//! Error types for trellis-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ProjectName;

/// All errors that can arise from workspace primitives and state persistence.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The workspace state file did not exist at the expected path.
    #[error("workspace state not found at {path}")]
    StateNotFound { path: PathBuf },

    /// Another project already holds the requested name.
    #[error("a project named '{name}' already exists")]
    NameTaken { name: ProjectName },

    /// Another project already lives in the requested directory.
    #[error("directory {directory} already belongs to project '{owner}'")]
    LocationTaken { directory: PathBuf, owner: ProjectName },

    /// No project with this name exists in the workspace.
    #[error("no project named '{name}' in the workspace")]
    UnknownProject { name: ProjectName },

    /// The project has no directory yet, so nothing can be keyed on it.
    #[error("project '{name}' has no location")]
    NoLocation { name: ProjectName },
}

/// Convenience constructor for [`WorkspaceError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io {
        path: path.into(),
        source,
    }
}
