//! Error types for trellis-sync.

use std::path::PathBuf;

use thiserror::Error;

use trellis_core::{ProjectName, WorkspaceError};

use crate::report::SyncReport;

/// Failures while fetching a build model.
#[derive(Debug, Error)]
pub enum FetchError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The exported model could not be parsed.
    #[error("invalid build model at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The build tool has not exported a model for this root.
    #[error("no build model exported at {path}")]
    MissingModel { path: PathBuf },

    /// The fetch was cancelled before it completed.
    #[error("model fetch cancelled")]
    Cancelled,
}

/// All errors that can arise from synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The desired name is held by a project that is not being renamed away.
    #[error("cannot name module at {directory} '{name}': project '{holder}' already has that name")]
    NamingConflict {
        name: ProjectName,
        directory: PathBuf,
        holder: ProjectName,
    },

    /// A module belongs to none of the roots being synchronized.
    #[error("module '{module}' at {directory} is not part of any synchronized build")]
    NotInBuild {
        module: ProjectName,
        directory: PathBuf,
    },

    /// Wraps whatever went wrong while applying one module.
    #[error("cannot synchronize module '{module}': {source}")]
    Module {
        module: ProjectName,
        #[source]
        source: Box<SyncError>,
    },

    /// A workspace primitive failed.
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// The build model could not be fetched.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The run was cancelled; `report` holds what was applied before that.
    #[error("synchronization cancelled")]
    Cancelled { report: SyncReport },
}

impl SyncError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            SyncError::Cancelled { .. } | SyncError::Fetch(FetchError::Cancelled)
        )
    }
}

/// Convenience constructor for [`FetchError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.into(),
        source,
    }
}
