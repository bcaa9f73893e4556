//! Background runtime for workspace synchronization: a job queue with one
//! processor, terminal status callbacks, and the removal listener.

mod error;
pub mod listener;
mod logging;
pub mod runner;

pub use error::JobError;
pub use listener::{RemovalListener, WorkspaceEvent, DEBOUNCE_WINDOW};
pub use logging::init_tracing;
pub use runner::{JobHandle, JobRunner, JobState, JobStatus, JobSummary, StatusCallback};
