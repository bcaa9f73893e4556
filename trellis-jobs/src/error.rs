use thiserror::Error;

/// Error surface for the job runtime.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("workspace error: {0}")]
    Workspace(#[from] trellis_core::WorkspaceError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },

    #[error("job runner has been shut down")]
    ShutDown,
}
